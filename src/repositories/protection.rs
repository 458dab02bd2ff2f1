use crate::models::{
    points::Activity,
    protection::{HighDailyEarner, RapidEarner, SharedIp},
};

use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Platform-wide abuse queries backing the admin suspicious-activity view.
#[derive(Clone)]
pub struct ProtectionRepository {
    conn: PgPool,
}

impl ProtectionRepository {
    pub fn new(conn: PgPool) -> Self {
        ProtectionRepository { conn }
    }

    pub async fn high_daily_earners(
        &self,
        today: DateTime<Utc>,
        threshold: i64,
    ) -> Result<Vec<HighDailyEarner>, anyhow::Error> {
        let rows = sqlx::query_as::<_, HighDailyEarner>(
            r#"SELECT p.user_id, u.name, u.email,
                SUM(p.points) AS daily_points,
                COUNT(p.id) AS activities_count
            FROM point_logs p
            JOIN users u ON u.id = p.user_id
            WHERE p.created_at >= $1 AND p.activity = ANY($2)
            GROUP BY p.user_id, u.name, u.email
            HAVING SUM(p.points) > $3
            ORDER BY daily_points DESC"#,
        )
        .bind(today)
        .bind(Activity::earning_names())
        .bind(threshold)
        .fetch_all(&self.conn)
        .await?;

        Ok(rows)
    }

    pub async fn shared_ips(&self, max_accounts: i64) -> Result<Vec<SharedIp>, anyhow::Error> {
        let rows = sqlx::query_as::<_, SharedIp>(
            r#"SELECT ip_address, COUNT(id) AS user_count, ARRAY_AGG(id ORDER BY created_at) AS user_ids
            FROM users
            WHERE ip_address IS NOT NULL
            GROUP BY ip_address
            HAVING COUNT(id) > $1
            ORDER BY user_count DESC"#,
        )
        .bind(max_accounts)
        .fetch_all(&self.conn)
        .await?;

        Ok(rows)
    }

    pub async fn rapid_earners(
        &self,
        since: DateTime<Utc>,
        threshold: i64,
    ) -> Result<Vec<RapidEarner>, anyhow::Error> {
        let rows = sqlx::query_as::<_, RapidEarner>(
            r#"SELECT p.user_id, u.name, u.email, COUNT(p.id) AS activities_count
            FROM point_logs p
            JOIN users u ON u.id = p.user_id
            WHERE p.created_at >= $1
            GROUP BY p.user_id, u.name, u.email
            HAVING COUNT(p.id) > $2
            ORDER BY activities_count DESC"#,
        )
        .bind(since)
        .bind(threshold)
        .fetch_all(&self.conn)
        .await?;

        Ok(rows)
    }
}
