use crate::models::{
    withdrawals::{self, WithdrawalStatus},
    PageQuery,
};

use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Clone)]
pub struct WithdrawalRepository {
    conn: PgPool,
}

impl WithdrawalRepository {
    pub fn new(conn: PgPool) -> Self {
        WithdrawalRepository { conn }
    }

    pub async fn insert_withdrawal<'e, E: PgExecutor<'e>>(
        &self,
        executor: E,
        user_id: &str,
        points_redeemed: i32,
        amount_in_cents: i32,
        payment_method: &str,
    ) -> Result<withdrawals::WithdrawalRequest, anyhow::Error> {
        let withdrawal_id = Uuid::new_v4().hyphenated().to_string();

        let withdrawal = sqlx::query_as::<_, withdrawals::WithdrawalRequest>(
            r#"INSERT INTO withdrawal_requests
            (id, user_id, points_redeemed, amount_in_cents, payment_method, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING *"#,
        )
        .bind(withdrawal_id)
        .bind(user_id)
        .bind(points_redeemed)
        .bind(amount_in_cents)
        .bind(payment_method)
        .fetch_one(executor)
        .await?;

        Ok(withdrawal)
    }

    pub async fn lock_withdrawal<'e, E: PgExecutor<'e>>(
        &self,
        executor: E,
        id: &str,
    ) -> Result<Option<withdrawals::WithdrawalRequest>, anyhow::Error> {
        let withdrawal = sqlx::query_as::<_, withdrawals::WithdrawalRequest>(
            "SELECT * FROM withdrawal_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(withdrawal)
    }

    pub async fn update_status<'e, E: PgExecutor<'e>>(
        &self,
        executor: E,
        id: &str,
        status: WithdrawalStatus,
        transaction_id: Option<&str>,
    ) -> Result<withdrawals::WithdrawalRequest, anyhow::Error> {
        let withdrawal = sqlx::query_as::<_, withdrawals::WithdrawalRequest>(
            r#"UPDATE withdrawal_requests
            SET status = $1, transaction_id = COALESCE($2, transaction_id), updated_at = CURRENT_TIMESTAMP
            WHERE id = $3
            RETURNING *"#,
        )
        .bind(status.as_str())
        .bind(transaction_id)
        .bind(id)
        .fetch_one(executor)
        .await?;

        Ok(withdrawal)
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<withdrawals::WithdrawalRequest>, anyhow::Error> {
        let withdrawals = sqlx::query_as::<_, withdrawals::WithdrawalRequest>(
            "SELECT * FROM withdrawal_requests WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(withdrawals)
    }

    pub async fn list_with_users(
        &self,
        status: Option<WithdrawalStatus>,
        page: &PageQuery,
    ) -> Result<(Vec<withdrawals::WithdrawalWithUser>, i64), anyhow::Error> {
        let status = status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM withdrawal_requests WHERE $1::text IS NULL OR status = $1",
        )
        .bind(status)
        .fetch_one(&self.conn)
        .await?;

        let withdrawals = sqlx::query_as::<_, withdrawals::WithdrawalWithUser>(
            r#"SELECT w.*, u.name AS user_name, u.email AS user_email
            FROM withdrawal_requests w
            JOIN users u ON u.id = w.user_id
            WHERE $1::text IS NULL OR w.status = $1
            ORDER BY w.created_at DESC
            LIMIT $2 OFFSET $3"#,
        )
        .bind(status)
        .bind(page.per_page())
        .bind(page.offset())
        .fetch_all(&self.conn)
        .await?;

        Ok((withdrawals, total))
    }
}
