use serde::Serialize;

use super::{points::PointLog, sessions::GameSession, users::UserDetails, withdrawals::WithdrawalRequest};

#[derive(Clone, Debug, Default, Serialize)]
pub struct UserStats {
    pub total: i64,
    pub new_today: i64,
    pub active_today: i64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct PointTotals {
    pub total_distributed: i64,
    pub distributed_today: i64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct GameStats {
    pub total: i64,
    pub sessions_today: i64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct WithdrawalStats {
    pub pending: i64,
    pub total: i64,
    pub approved_amount_in_cents: i64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ReferralStats {
    pub total: i64,
    pub today: i64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Dashboard {
    pub users: UserStats,
    pub points: PointTotals,
    pub games: GameStats,
    pub withdrawals: WithdrawalStats,
    pub referrals: ReferralStats,
}

#[derive(Clone, Debug, Serialize)]
pub struct UserActivity {
    pub user: UserDetails,
    pub recent_points: Vec<PointLog>,
    pub recent_sessions: Vec<GameSession>,
    pub withdrawals: Vec<WithdrawalRequest>,
}
