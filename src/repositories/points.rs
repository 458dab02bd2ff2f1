use crate::models::{
    points::{self, Activity},
    PageQuery,
};

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

const COUNT_ACTIVITY: &str =
    "SELECT COUNT(1) FROM point_logs WHERE user_id = $1 AND activity = $2 AND created_at >= $3";
const COUNT_STANDALONE_ACTIVITY: &str = "SELECT COUNT(1) FROM point_logs WHERE user_id = $1 AND activity = $2 AND created_at >= $3 AND game_id IS NULL";
const COUNT_GAME_ACTIVITY: &str = "SELECT COUNT(1) FROM point_logs WHERE user_id = $1 AND activity = $2 AND created_at >= $3 AND game_id = $4";

/// Which point logs an activity count looks at.
#[derive(Clone, Copy, Debug)]
pub enum GameScope<'a> {
    Any,
    Standalone,
    Game(&'a str),
}

#[derive(Clone)]
pub struct PointRepository {
    conn: PgPool,
}

impl PointRepository {
    pub fn new(conn: PgPool) -> Self {
        PointRepository { conn }
    }

    pub fn pool(&self) -> &PgPool {
        &self.conn
    }

    /// Appends a ledger row and moves the balance by the same delta.
    /// Both statements run on `conn`, which must be inside a transaction.
    pub async fn apply(
        &self,
        conn: &mut PgConnection,
        user_id: &str,
        points: i32,
        activity: Activity,
        game_id: Option<&str>,
        ad_id: Option<&str>,
    ) -> Result<i32, anyhow::Error> {
        let log_id = Uuid::new_v4().hyphenated().to_string();

        sqlx::query(
            r#"INSERT INTO point_logs (id, user_id, points, activity, game_id, ad_id)
            VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(log_id)
        .bind(user_id)
        .bind(points)
        .bind(activity.as_str())
        .bind(game_id)
        .bind(ad_id)
        .execute(&mut *conn)
        .await?;

        let balance: i32 = sqlx::query_scalar(
            "UPDATE users SET points = points + $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING points",
        )
        .bind(points)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(balance)
    }

    /// Sum of earning activity since `since`; ledger corrections are excluded.
    pub async fn earned_since<'e, E: PgExecutor<'e>>(
        &self,
        executor: E,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, anyhow::Error> {
        let amount: i64 = sqlx::query_scalar(
            r#"SELECT COALESCE(SUM(points), 0) FROM point_logs
            WHERE user_id = $1 AND created_at >= $2 AND activity = ANY($3)"#,
        )
        .bind(user_id)
        .bind(since)
        .bind(Activity::earning_names())
        .fetch_one(executor)
        .await?;

        Ok(amount)
    }

    pub async fn total_earned(&self, user_id: &str) -> Result<i64, anyhow::Error> {
        let amount: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(points), 0) FROM point_logs WHERE user_id = $1 AND activity = ANY($2)",
        )
        .bind(user_id)
        .bind(Activity::earning_names())
        .fetch_one(&self.conn)
        .await?;

        Ok(amount)
    }

    pub async fn count_activity_since<'e, E: PgExecutor<'e>>(
        &self,
        executor: E,
        user_id: &str,
        activity: Activity,
        scope: GameScope<'_>,
        since: DateTime<Utc>,
    ) -> Result<i64, anyhow::Error> {
        let count: i64 = match scope {
            GameScope::Any => {
                sqlx::query_scalar(COUNT_ACTIVITY)
                    .bind(user_id)
                    .bind(activity.as_str())
                    .bind(since)
                    .fetch_one(executor)
                    .await?
            }
            GameScope::Standalone => {
                sqlx::query_scalar(COUNT_STANDALONE_ACTIVITY)
                    .bind(user_id)
                    .bind(activity.as_str())
                    .bind(since)
                    .fetch_one(executor)
                    .await?
            }
            GameScope::Game(game_id) => {
                sqlx::query_scalar(COUNT_GAME_ACTIVITY)
                    .bind(user_id)
                    .bind(activity.as_str())
                    .bind(since)
                    .bind(game_id)
                    .fetch_one(executor)
                    .await?
            }
        };

        Ok(count)
    }

    /// Earning actions since `since`; ledger corrections are not user actions.
    pub async fn count_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, anyhow::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM point_logs WHERE user_id = $1 AND created_at >= $2 AND activity = ANY($3)",
        )
        .bind(user_id)
        .bind(since)
        .bind(Activity::earning_names())
        .fetch_one(&self.conn)
        .await?;

        Ok(count)
    }

    /// Creation times of the user's earning logs since `since`, oldest first.
    pub async fn log_times_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, anyhow::Error> {
        let times: Vec<DateTime<Utc>> = sqlx::query_scalar(
            r#"SELECT created_at FROM point_logs
            WHERE user_id = $1 AND created_at >= $2 AND activity = ANY($3)
            ORDER BY created_at ASC"#,
        )
        .bind(user_id)
        .bind(since)
        .bind(Activity::earning_names())
        .fetch_all(&self.conn)
        .await?;

        Ok(times)
    }

    pub async fn history(
        &self,
        user_id: &str,
        page: &PageQuery,
    ) -> Result<(Vec<points::PointLog>, i64), anyhow::Error> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM point_logs WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.conn)
            .await?;

        let logs = sqlx::query_as::<_, points::PointLog>(
            "SELECT * FROM point_logs WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(page.per_page())
        .bind(page.offset())
        .fetch_all(&self.conn)
        .await?;

        Ok((logs, total))
    }

    pub async fn recent(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<points::PointLog>, anyhow::Error> {
        let logs = sqlx::query_as::<_, points::PointLog>(
            "SELECT * FROM point_logs WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.conn)
        .await?;

        Ok(logs)
    }
}
