use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the four independent abuse checks for one user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AbuseChecks {
    pub rapid_clicking: bool,
    pub device_abuse: bool,
    pub unusual_earning: bool,
    pub bot_behavior: bool,
}

impl AbuseChecks {
    pub fn flag_count(&self) -> usize {
        [
            self.rapid_clicking,
            self.device_abuse,
            self.unusual_earning,
            self.bot_behavior,
        ]
        .iter()
        .filter(|flag| **flag)
        .count()
    }

    pub fn issues(&self) -> Vec<&'static str> {
        let mut issues = Vec::new();
        if self.rapid_clicking {
            issues.push("rapid_clicking");
        }
        if self.unusual_earning {
            issues.push("unusual_earning");
        }
        if self.bot_behavior {
            issues.push("bot_behavior");
        }
        if self.device_abuse {
            issues.push("device_abuse");
        }
        issues
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Warn,
    Block,
    Ban,
}

impl Verdict {
    pub fn from_flag_count(flags: usize) -> Self {
        match flags {
            0 => Verdict::Allow,
            1 => Verdict::Warn,
            2 => Verdict::Block,
            _ => Verdict::Ban,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow | Verdict::Warn)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Assessment {
    pub verdict: Verdict,
    pub checks: AbuseChecks,
}

impl Assessment {
    pub fn new(checks: AbuseChecks) -> Self {
        Assessment {
            verdict: Verdict::from_flag_count(checks.flag_count()),
            checks,
        }
    }
}

/// Raw numbers the heuristics are computed from.
#[derive(Clone, Debug, Default)]
pub struct ActivitySnapshot {
    pub recent_actions: i64,
    pub accounts_on_ip: i64,
    pub earned_today: i64,
    pub daily_points_cap: i32,
    pub recent_log_times: Vec<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ActionCheck {
    pub action_type: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DeviceInfo {
    pub screen_resolution: Option<String>,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub platform: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AdCompletion {
    pub ad_id: Option<String>,
    #[serde(default)]
    pub watch_duration: f64,
    pub expected_duration: Option<f64>,
    #[serde(default)]
    pub interaction_events: Vec<serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SuspiciousReport {
    pub reported_user_id: Option<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub evidence: serde_json::Value,
}

#[derive(Clone, Debug, Serialize)]
pub struct DailyLimits {
    pub daily_points_earned: i64,
    pub daily_points_cap: i32,
    pub remaining_points: i64,
    pub ads_watched_today: i64,
    pub max_ads_per_day: i64,
    pub games_played_today: i64,
    pub can_earn_more: bool,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct HighDailyEarner {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub daily_points: i64,
    pub activities_count: i64,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct SharedIp {
    pub ip_address: String,
    pub user_count: i64,
    pub user_ids: Vec<String>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct RapidEarner {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub activities_count: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SuspiciousActivity {
    pub high_daily_points: Vec<HighDailyEarner>,
    pub duplicate_ips: Vec<SharedIp>,
    pub rapid_earners: Vec<RapidEarner>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_policy() {
        assert_eq!(Verdict::from_flag_count(0), Verdict::Allow);
        assert_eq!(Verdict::from_flag_count(1), Verdict::Warn);
        assert_eq!(Verdict::from_flag_count(2), Verdict::Block);
        assert_eq!(Verdict::from_flag_count(3), Verdict::Ban);
        assert_eq!(Verdict::from_flag_count(4), Verdict::Ban);
        assert!(Verdict::Warn.is_allowed());
        assert!(!Verdict::Block.is_allowed());
    }

    #[test]
    fn test_flag_count_and_issues() {
        let checks = AbuseChecks {
            rapid_clicking: true,
            device_abuse: true,
            unusual_earning: false,
            bot_behavior: true,
        };
        assert_eq!(checks.flag_count(), 3);
        assert_eq!(
            checks.issues(),
            vec!["rapid_clicking", "bot_behavior", "device_abuse"]
        );
        assert_eq!(Assessment::new(checks).verdict, Verdict::Ban);
        assert_eq!(Assessment::new(AbuseChecks::default()).verdict, Verdict::Allow);
    }
}
