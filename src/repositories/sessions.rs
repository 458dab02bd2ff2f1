use crate::models::sessions;

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Clone)]
pub struct GameSessionRepository {
    conn: PgPool,
}

impl GameSessionRepository {
    pub fn new(conn: PgPool) -> Self {
        GameSessionRepository { conn }
    }

    pub async fn open_session<'e, E: PgExecutor<'e>>(
        &self,
        executor: E,
        user_id: &str,
        game_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<sessions::GameSession, anyhow::Error> {
        let session_id = Uuid::new_v4().hyphenated().to_string();

        let session = sqlx::query_as::<_, sessions::GameSession>(
            r#"INSERT INTO game_sessions (id, user_id, game_id, start_time)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, game_id, start_time, end_time, duration_minutes, created_at"#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(game_id)
        .bind(start_time)
        .fetch_one(executor)
        .await?;

        Ok(session)
    }

    /// Locks the user's session row for closing.
    pub async fn lock_session<'e, E: PgExecutor<'e>>(
        &self,
        executor: E,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<sessions::GameSession>, anyhow::Error> {
        let session = sqlx::query_as::<_, sessions::GameSession>(
            r#"SELECT id, user_id, game_id, start_time, end_time, duration_minutes, created_at
            FROM game_sessions WHERE id = $1 AND user_id = $2 FOR UPDATE"#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

        Ok(session)
    }

    pub async fn close_session<'e, E: PgExecutor<'e>>(
        &self,
        executor: E,
        session_id: &str,
        end_time: DateTime<Utc>,
        duration_minutes: f64,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"UPDATE game_sessions
            SET end_time = $1, duration_minutes = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $3"#,
        )
        .bind(end_time)
        .bind(duration_minutes)
        .bind(session_id)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn count_started_since<'e, E: PgExecutor<'e>>(
        &self,
        executor: E,
        user_id: &str,
        game_id: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, anyhow::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM game_sessions WHERE user_id = $1 AND game_id = $2 AND start_time >= $3",
        )
        .bind(user_id)
        .bind(game_id)
        .bind(since)
        .fetch_one(executor)
        .await?;

        Ok(count)
    }

    pub async fn recent_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<sessions::GameSession>, anyhow::Error> {
        let sessions = sqlx::query_as::<_, sessions::GameSession>(
            r#"SELECT id, user_id, game_id, start_time, end_time, duration_minutes, created_at
            FROM game_sessions WHERE user_id = $1 ORDER BY start_time DESC LIMIT $2"#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.conn)
        .await?;

        Ok(sessions)
    }
}
