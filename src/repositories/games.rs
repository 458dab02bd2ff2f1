use crate::models::games;

use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct GameRepository {
    conn: PgPool,
}

impl GameRepository {
    pub fn new(conn: PgPool) -> Self {
        GameRepository { conn }
    }

    pub async fn list_games(&self) -> Result<Vec<games::Game>, anyhow::Error> {
        let games = sqlx::query_as::<_, games::Game>("SELECT * FROM games ORDER BY created_at ASC")
            .fetch_all(&self.conn)
            .await?;

        Ok(games)
    }

    pub async fn get_game(&self, id: &str) -> Result<Option<games::Game>, anyhow::Error> {
        let game = sqlx::query_as::<_, games::Game>("SELECT * FROM games WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(game)
    }

    pub async fn insert_game(
        &self,
        name: &str,
        description: &str,
        html_path: &str,
        thumbnail: Option<&str>,
    ) -> Result<games::Game, anyhow::Error> {
        let game_id = Uuid::new_v4().hyphenated().to_string();

        let game = sqlx::query_as::<_, games::Game>(
            r#"INSERT INTO games (id, name, description, html_path, thumbnail)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *"#,
        )
        .bind(game_id)
        .bind(name)
        .bind(description)
        .bind(html_path)
        .bind(thumbnail)
        .fetch_one(&self.conn)
        .await?;

        Ok(game)
    }

    pub async fn count_games(&self) -> Result<i64, anyhow::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM games")
            .fetch_one(&self.conn)
            .await?;

        Ok(count)
    }
}
