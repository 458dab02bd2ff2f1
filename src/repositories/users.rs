use crate::models::{
    users::{self, LeaderboardEntry},
    PageQuery,
};

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Columns written on registration; everything else takes its table default.
pub struct UserRecord<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub phone_number: Option<&'a str>,
    pub google_id: Option<&'a str>,
    pub facebook_id: Option<&'a str>,
    pub daily_points_cap: i32,
    pub ip_address: Option<&'a str>,
}

#[derive(Clone)]
pub struct UserRepository {
    conn: PgPool,
}

impl UserRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub async fn insert_user<'e, E: PgExecutor<'e>>(
        &self,
        executor: E,
        record: &UserRecord<'_>,
    ) -> Result<users::User, anyhow::Error> {
        let user_id = Uuid::new_v4().hyphenated().to_string();

        let user = sqlx::query_as::<_, users::User>(
            r#"
                INSERT INTO users
                (id, name, email, password_hash, phone_number, google_id, facebook_id, daily_points_cap, ip_address)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(record.name)
        .bind(record.email)
        .bind(record.password_hash)
        .bind(record.phone_number)
        .bind(record.google_id)
        .bind(record.facebook_id)
        .bind(record.daily_points_cap)
        .bind(record.ip_address)
        .fetch_one(executor)
        .await?;

        Ok(user)
    }

    /// Finds a user already holding the given email or phone number.
    pub async fn find_existing(
        &self,
        email: &str,
        phone_number: Option<&str>,
    ) -> Result<Option<users::User>, anyhow::Error> {
        let user = sqlx::query_as::<_, users::User>(
            "SELECT * FROM users WHERE email = $1 OR ($2::text IS NOT NULL AND phone_number = $2) LIMIT 1",
        )
        .bind(email)
        .bind(phone_number)
        .fetch_optional(&self.conn)
        .await?;

        Ok(user)
    }

    pub async fn get_user_by_id(
        &self,
        user_id: &str,
    ) -> Result<Option<users::User>, anyhow::Error> {
        let user = sqlx::query_as::<_, users::User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    /// Row-locks the user for the rest of the surrounding transaction.
    pub async fn lock_user<'e, E: PgExecutor<'e>>(
        &self,
        executor: E,
        user_id: &str,
    ) -> Result<Option<users::User>, anyhow::Error> {
        let user = sqlx::query_as::<_, users::User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(executor)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<users::User>, anyhow::Error> {
        let user = sqlx::query_as::<_, users::User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    pub async fn record_login<'e, E: PgExecutor<'e>>(
        &self,
        executor: E,
        user_id: &str,
        ip_address: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            "UPDATE users SET last_login = $1, ip_address = COALESCE($2, ip_address), updated_at = CURRENT_TIMESTAMP WHERE id = $3",
        )
        .bind(at)
        .bind(ip_address)
        .bind(user_id)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn update_ip_address(
        &self,
        user_id: &str,
        ip_address: &str,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            "UPDATE users SET ip_address = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2",
        )
        .bind(ip_address)
        .bind(user_id)
        .execute(&self.conn)
        .await?;

        Ok(())
    }

    pub async fn set_level(&self, user_id: &str, level: i32) -> Result<bool, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE users SET level = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2",
        )
        .bind(level)
        .bind(user_id)
        .execute(&self.conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn count_by_ip(&self, ip_address: &str) -> Result<i64, anyhow::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE ip_address = $1")
            .bind(ip_address)
            .fetch_one(&self.conn)
            .await?;

        Ok(count)
    }

    pub async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, anyhow::Error> {
        let entries = sqlx::query_as::<_, LeaderboardEntry>(
            r#"
                SELECT ROW_NUMBER() OVER (ORDER BY points DESC, created_at ASC) AS rank, name, points, level
                FROM users
                ORDER BY points DESC, created_at ASC
                LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.conn)
        .await?;

        Ok(entries)
    }

    pub async fn search(
        &self,
        search: Option<&str>,
        page: &PageQuery,
    ) -> Result<(Vec<users::User>, i64), anyhow::Error> {
        let pattern = search
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let total: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(1) FROM users
            WHERE $1::text IS NULL OR name ILIKE $1 OR email ILIKE $1 OR phone_number ILIKE $1"#,
        )
        .bind(&pattern)
        .fetch_one(&self.conn)
        .await?;

        let users = sqlx::query_as::<_, users::User>(
            r#"SELECT * FROM users
            WHERE $1::text IS NULL OR name ILIKE $1 OR email ILIKE $1 OR phone_number ILIKE $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3"#,
        )
        .bind(&pattern)
        .bind(page.per_page())
        .bind(page.offset())
        .fetch_all(&self.conn)
        .await?;

        Ok((users, total))
    }
}
