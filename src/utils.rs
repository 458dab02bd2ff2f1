use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
    })
}

fn phone_regex() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("valid phone regex"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// E.164-ish: optional plus, no leading zero, at most 15 digits.
pub fn is_valid_phone(phone: &str) -> bool {
    phone_regex().is_match(phone)
}

/// Returns the trimmed value when it is present and non-empty.
pub fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Midnight UTC of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

pub fn days_ago(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    start_of_day(now) - Duration::days(days)
}

pub fn device_fingerprint(ip_address: &str, user_agent: &str) -> String {
    let digest = Sha256::digest(format!("{}_{}", ip_address, user_agent).as_bytes());
    format!("{:x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("player@example.com"));
        assert!(is_valid_email("first.last+tag@sub.domain.org"));
        assert!(!is_valid_email("player@example"));
        assert!(!is_valid_email("not an email"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_phone_validation() {
        assert!(is_valid_phone("+201001234567"));
        assert!(is_valid_phone("15551234"));
        assert!(!is_valid_phone("0123"));
        assert!(!is_valid_phone("+1234567890123456"));
        assert!(!is_valid_phone("phone"));
    }

    #[test]
    fn test_required() {
        assert_eq!(required(&Some("  name ".to_string())), Some("name"));
        assert_eq!(required(&Some("   ".to_string())), None);
        assert_eq!(required(&None), None);
    }

    #[test]
    fn test_start_of_day() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 17, 45, 12).unwrap();
        let midnight = Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap();
        assert_eq!(start_of_day(now), midnight);
        assert_eq!(
            days_ago(now, 7),
            Utc.with_ymd_and_hms(2025, 3, 7, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_device_fingerprint_is_stable() {
        let a = device_fingerprint("10.0.0.1", "Mozilla/5.0");
        let b = device_fingerprint("10.0.0.1", "Mozilla/5.0");
        let c = device_fingerprint("10.0.0.2", "Mozilla/5.0");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
