use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Ad {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub provider: String,
    pub duration_seconds: Option<i32>,
    pub points_reward: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AdView {
    pub ad_id: Option<String>,
}
