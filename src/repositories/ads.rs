use crate::models::ads;

use sqlx::PgPool;

#[derive(Clone)]
pub struct AdRepository {
    conn: PgPool,
}

impl AdRepository {
    pub fn new(conn: PgPool) -> Self {
        AdRepository { conn }
    }

    pub async fn list_ads(&self) -> Result<Vec<ads::Ad>, anyhow::Error> {
        let ads = sqlx::query_as::<_, ads::Ad>(
            "SELECT id, name, kind, provider, duration_seconds, points_reward, created_at FROM ads ORDER BY name",
        )
        .fetch_all(&self.conn)
        .await?;

        Ok(ads)
    }

    pub async fn get_ad(&self, id: &str) -> Result<Option<ads::Ad>, anyhow::Error> {
        let ad = sqlx::query_as::<_, ads::Ad>(
            "SELECT id, name, kind, provider, duration_seconds, points_reward, created_at FROM ads WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(ad)
    }
}
