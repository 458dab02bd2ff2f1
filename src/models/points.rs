use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activity {
    PlayGame,
    WatchAd,
    DailyLogin,
    InviteFriend,
    AdminAdjustment,
    Withdrawal,
    WithdrawalRefund,
}

impl Activity {
    pub const EARNING: [Activity; 4] = [
        Activity::PlayGame,
        Activity::WatchAd,
        Activity::DailyLogin,
        Activity::InviteFriend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::PlayGame => "play_game",
            Activity::WatchAd => "watch_ad",
            Activity::DailyLogin => "daily_login",
            Activity::InviteFriend => "invite_friend",
            Activity::AdminAdjustment => "admin_adjustment",
            Activity::Withdrawal => "withdrawal",
            Activity::WithdrawalRefund => "withdrawal_refund",
        }
    }

    /// Whether points from this activity count toward the daily cap.
    pub fn is_earning(&self) -> bool {
        Self::EARNING.contains(self)
    }

    /// Activity names fed to `= ANY($n)` filters on earned totals.
    pub fn earning_names() -> Vec<String> {
        Self::EARNING.iter().map(|a| a.as_str().to_string()).collect()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct PointLog {
    pub id: String,
    pub user_id: String,
    pub points: i32,
    pub activity: String,
    pub game_id: Option<String>,
    pub ad_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Balance {
    pub points: i32,
    pub daily_points_earned: i64,
    pub daily_points_cap: i32,
    pub level: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct Award {
    pub points_awarded: i32,
    pub total_points: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct PointStats {
    pub today_points: i64,
    pub week_points: i64,
    pub month_points: i64,
    pub total_earned: i64,
    pub current_balance: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earning_activities() {
        assert!(Activity::WatchAd.is_earning());
        assert!(Activity::DailyLogin.is_earning());
        assert!(!Activity::AdminAdjustment.is_earning());
        assert!(!Activity::Withdrawal.is_earning());
        assert!(!Activity::WithdrawalRefund.is_earning());
        assert_eq!(
            Activity::earning_names(),
            vec!["play_game", "watch_ad", "daily_login", "invite_friend"]
        );
    }
}
