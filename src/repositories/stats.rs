use crate::models::{
    points::Activity,
    stats::{Dashboard, GameStats, PointTotals, ReferralStats, UserStats, WithdrawalStats},
};

use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[derive(Clone)]
pub struct StatsRepository {
    conn: PgPool,
}

impl StatsRepository {
    pub fn new(conn: PgPool) -> Self {
        StatsRepository { conn }
    }

    async fn scalar(&self, sql: &str, since: Option<DateTime<Utc>>) -> Result<i64, anyhow::Error> {
        let mut query = sqlx::query_scalar::<_, i64>(sql);
        if let Some(since) = since {
            query = query.bind(since);
        }

        Ok(query.fetch_one(&self.conn).await?)
    }

    pub async fn dashboard(&self, today: DateTime<Utc>) -> Result<Dashboard, anyhow::Error> {
        let users = UserStats {
            total: self.scalar("SELECT COUNT(1) FROM users", None).await?,
            new_today: self
                .scalar("SELECT COUNT(1) FROM users WHERE created_at >= $1", Some(today))
                .await?,
            active_today: self
                .scalar("SELECT COUNT(1) FROM users WHERE last_login >= $1", Some(today))
                .await?,
        };

        let earning = Activity::earning_names();
        let total_distributed: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(points), 0) FROM point_logs WHERE activity = ANY($1)",
        )
        .bind(&earning)
        .fetch_one(&self.conn)
        .await?;
        let distributed_today: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(points), 0) FROM point_logs WHERE activity = ANY($1) AND created_at >= $2",
        )
        .bind(&earning)
        .bind(today)
        .fetch_one(&self.conn)
        .await?;

        let games = GameStats {
            total: self.scalar("SELECT COUNT(1) FROM games", None).await?,
            sessions_today: self
                .scalar(
                    "SELECT COUNT(1) FROM game_sessions WHERE start_time >= $1",
                    Some(today),
                )
                .await?,
        };

        let withdrawals = WithdrawalStats {
            pending: self
                .scalar(
                    "SELECT COUNT(1) FROM withdrawal_requests WHERE status = 'pending'",
                    None,
                )
                .await?,
            total: self
                .scalar("SELECT COUNT(1) FROM withdrawal_requests", None)
                .await?,
            approved_amount_in_cents: self
                .scalar(
                    "SELECT COALESCE(SUM(amount_in_cents), 0) FROM withdrawal_requests WHERE status = 'approved'",
                    None,
                )
                .await?,
        };

        let referrals = ReferralStats {
            total: self.scalar("SELECT COUNT(1) FROM referrals", None).await?,
            today: self
                .scalar(
                    "SELECT COUNT(1) FROM referrals WHERE created_at >= $1",
                    Some(today),
                )
                .await?,
        };

        Ok(Dashboard {
            users,
            points: PointTotals {
                total_distributed,
                distributed_today,
            },
            games,
            withdrawals,
            referrals,
        })
    }
}
