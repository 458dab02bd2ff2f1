use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Referral {
    pub id: String,
    pub referrer_id: String,
    pub referred_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReferralAction {
    CreateLink,
    ProcessReferral { referred_email: Option<String> },
}

#[derive(Clone, Debug, Serialize)]
pub struct ReferralLink {
    pub referral_link: String,
    pub referral_code: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum ReferralOutcome {
    Link(ReferralLink),
    Processed { points_awarded: i32 },
}
