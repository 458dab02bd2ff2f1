//! Threshold heuristics over a user's recent activity.
//!
//! Everything here is pure: the protection handler gathers an
//! [`ActivitySnapshot`] from the database and hands it to [`Detector::assess`].

use chrono::{DateTime, Utc};

use crate::models::protection::{AbuseChecks, ActivitySnapshot, Assessment};
use crate::settings::Protection;

#[derive(Clone, Debug)]
pub struct Detector {
    settings: Protection,
}

impl Detector {
    pub fn new(settings: Protection) -> Self {
        Detector { settings }
    }

    pub fn settings(&self) -> &Protection {
        &self.settings
    }

    pub fn is_rapid(&self, recent_actions: i64) -> bool {
        recent_actions > self.settings.rapid_max_actions
    }

    pub fn is_device_reuse(&self, accounts_on_ip: i64) -> bool {
        accounts_on_ip > self.settings.max_accounts_per_ip
    }

    pub fn is_over_cap(&self, earned_today: i64, daily_points_cap: i32) -> bool {
        earned_today > daily_points_cap as i64 * self.settings.daily_cap_multiplier
    }

    pub fn is_bot_like(&self, log_times: &[DateTime<Utc>]) -> bool {
        if log_times.len() < self.settings.regularity_min_logs.max(2) {
            return false;
        }

        is_regular(
            &intervals(log_times),
            self.settings.regularity_tolerance_seconds,
            self.settings.regularity_ratio,
        )
    }

    pub fn assess(&self, snapshot: &ActivitySnapshot) -> Assessment {
        Assessment::new(AbuseChecks {
            rapid_clicking: self.is_rapid(snapshot.recent_actions),
            device_abuse: self.is_device_reuse(snapshot.accounts_on_ip),
            unusual_earning: self.is_over_cap(snapshot.earned_today, snapshot.daily_points_cap),
            bot_behavior: self.is_bot_like(&snapshot.recent_log_times),
        })
    }
}

/// Seconds between consecutive timestamps.
pub fn intervals(times: &[DateTime<Utc>]) -> Vec<f64> {
    times
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds() as f64 / 1000.0)
        .collect()
}

/// True when at least `ratio` of the intervals sit strictly closer than
/// `tolerance` seconds to their mean.
pub fn is_regular(intervals: &[f64], tolerance: f64, ratio: f64) -> bool {
    if intervals.is_empty() {
        return false;
    }

    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
    let similar = intervals
        .iter()
        .filter(|interval| (*interval - mean).abs() < tolerance)
        .count();

    similar as f64 / intervals.len() as f64 >= ratio
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::protection::Verdict;
    use chrono::Duration;

    fn detector() -> Detector {
        Detector::new(Protection::default())
    }

    fn times_from_gaps(gaps: &[i64]) -> Vec<DateTime<Utc>> {
        let mut at = Utc::now() - Duration::minutes(30);
        let mut times = vec![at];
        for gap in gaps {
            at += Duration::seconds(*gap);
            times.push(at);
        }
        times
    }

    #[test]
    fn test_rapid_threshold() {
        let detector = detector();
        assert!(!detector.is_rapid(20));
        assert!(detector.is_rapid(21));
    }

    #[test]
    fn test_device_reuse_threshold() {
        let detector = detector();
        assert!(!detector.is_device_reuse(3));
        assert!(detector.is_device_reuse(4));
    }

    #[test]
    fn test_over_cap_threshold() {
        let detector = detector();
        assert!(!detector.is_over_cap(100, 50));
        assert!(detector.is_over_cap(101, 50));
        assert!(detector.is_over_cap(1, 0));
    }

    #[test]
    fn test_uniform_intervals_are_bot_like() {
        assert!(is_regular(&[10.0, 10.0, 10.0, 10.0], 2.0, 0.8));
        assert!(detector().is_bot_like(&times_from_gaps(&[10, 10, 10, 10])));
    }

    #[test]
    fn test_irregular_intervals_are_not_bot_like() {
        assert!(!is_regular(&[10.0, 50.0, 5.0, 30.0], 2.0, 0.8));
        assert!(!detector().is_bot_like(&times_from_gaps(&[10, 50, 5, 30])));
    }

    #[test]
    fn test_eighty_percent_boundary() {
        // mean 14: every interval is at least 4s away
        assert!(!is_regular(&[10.0, 10.0, 10.0, 10.0, 30.0], 2.0, 0.8));
        // mean 12: 10s intervals are exactly 2s away, which is not close enough
        assert!(!is_regular(&[10.0, 10.0, 10.0, 10.0, 20.0], 2.0, 0.8));
        // mean 11.8: four of five intervals are 1.8s away
        assert!(is_regular(&[10.0, 10.0, 10.0, 10.0, 19.0], 2.0, 0.8));
        assert!(!is_regular(&[10.0, 10.0, 10.0, 25.0, 25.0], 2.0, 0.8));
    }

    #[test]
    fn test_too_few_logs_never_flag() {
        let detector = detector();
        assert!(!detector.is_bot_like(&times_from_gaps(&[10, 10, 10])));
        assert!(!detector.is_bot_like(&[]));
        assert!(!is_regular(&[], 2.0, 0.8));
    }

    #[test]
    fn test_intervals() {
        let times = times_from_gaps(&[3, 7]);
        assert_eq!(intervals(&times), vec![3.0, 7.0]);
        assert!(intervals(&times[..1]).is_empty());
    }

    #[test]
    fn test_assess_combines_checks() {
        let detector = detector();
        let snapshot = ActivitySnapshot {
            recent_actions: 25,
            accounts_on_ip: 5,
            earned_today: 120,
            daily_points_cap: 50,
            recent_log_times: times_from_gaps(&[10, 10, 10, 10]),
        };

        let assessment = detector.assess(&snapshot);
        assert_eq!(assessment.checks.flag_count(), 4);
        assert_eq!(assessment.verdict, Verdict::Ban);

        let quiet = ActivitySnapshot {
            daily_points_cap: 50,
            ..ActivitySnapshot::default()
        };
        assert_eq!(detector.assess(&quiet).verdict, Verdict::Allow);

        let two_flags = ActivitySnapshot {
            recent_actions: 21,
            accounts_on_ip: 4,
            daily_points_cap: 50,
            ..ActivitySnapshot::default()
        };
        assert_eq!(detector.assess(&two_flags).verdict, Verdict::Block);
    }
}
