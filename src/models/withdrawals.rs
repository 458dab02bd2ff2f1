use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PAYMENT_METHODS: [&str; 3] = ["payeer", "mobile_credit", "gift_card"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(WithdrawalStatus::Pending),
            "approved" => Some(WithdrawalStatus::Approved),
            "rejected" => Some(WithdrawalStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct WithdrawalRequest {
    pub id: String,
    pub user_id: String,
    pub points_redeemed: i32,
    pub amount_in_cents: i32,
    pub payment_method: String,
    pub status: String,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WithdrawalRequest {
    pub fn is_pending(&self) -> bool {
        self.status == WithdrawalStatus::Pending.as_str()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewWithdrawal {
    pub points: Option<i32>,
    pub payment_method: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct WithdrawalReceipt {
    pub withdrawal_id: String,
    pub amount_in_cents: i32,
    pub remaining_points: i32,
}

/// Admin listing row: the request joined with its owner's name and email.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct WithdrawalWithUser {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub withdrawal: WithdrawalRequest,
    pub user_name: String,
    pub user_email: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WithdrawalDecision {
    pub transaction_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WithdrawalFilter {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(
            WithdrawalStatus::parse("pending"),
            Some(WithdrawalStatus::Pending)
        );
        assert_eq!(
            WithdrawalStatus::parse("approved").map(|s| s.as_str()),
            Some("approved")
        );
        assert_eq!(WithdrawalStatus::parse("all"), None);
    }
}
