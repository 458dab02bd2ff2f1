use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct GameSession {
    pub id: String,
    pub user_id: String,
    pub game_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionStarted {
    pub session_id: String,
    pub points_awarded: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionEnded {
    pub duration_minutes: f64,
    pub points_awarded: i32,
}

/// Minutes elapsed between two instants, with sub-second precision.
pub fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 60_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_duration_minutes() {
        let start = Utc::now();
        assert_eq!(duration_minutes(start, start + Duration::seconds(90)), 1.5);
        assert_eq!(duration_minutes(start, start), 0.0);
    }
}
