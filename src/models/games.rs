use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Game {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub html_path: String,
    pub thumbnail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewGame {
    pub name: Option<String>,
    pub description: Option<String>,
    pub html_path: Option<String>,
    pub thumbnail: Option<String>,
}
