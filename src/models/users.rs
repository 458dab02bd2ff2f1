use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const BANNED_LEVEL: i32 = 0;
pub const DEFAULT_LEVEL: i32 = 1;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone_number: Option<String>,
    pub google_id: Option<String>,
    pub facebook_id: Option<String>,
    pub points: i32,
    pub daily_points_cap: i32,
    pub level: i32,
    pub ip_address: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_banned(&self) -> bool {
        self.level == BANNED_LEVEL
    }

    pub fn details(&self, daily_points_earned: i64) -> UserDetails {
        UserDetails {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            phone_number: self.phone_number.clone(),
            points: self.points,
            level: self.level,
            daily_points_cap: self.daily_points_cap,
            daily_points_earned,
            last_login: self.last_login,
            created_at: self.created_at,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone_number: Option<String>,
    pub google_id: Option<String>,
    pub facebook_id: Option<String>,
    pub referred_by: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Public projection of a user; never carries the credential hash.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UserDetails {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub points: i32,
    pub level: i32,
    pub daily_points_cap: i32,
    pub daily_points_earned: i64,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub name: String,
    pub points: i32,
    pub level: i32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PointAdjustment {
    pub points: Option<i32>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BanRequest {
    #[serde(default = "default_banned")]
    pub banned: bool,
    #[serde(default)]
    pub reason: String,
}

fn default_banned() -> bool {
    true
}
