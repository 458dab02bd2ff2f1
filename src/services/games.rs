use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};

use super::points::{award_if_under_cap, record_ad_view};
use super::protection::{ensure_allowed, ProtectionRequest};
use super::{RequestHandler, Service, ServiceError, SharedRewards};
use crate::models::{
    ads::Ad,
    games::{Game, NewGame},
    points::{Activity, Award},
    sessions::{self, GameSession, SessionEnded, SessionStarted},
    users::LeaderboardEntry,
};
use crate::repositories::{
    ads::AdRepository,
    games::GameRepository,
    points::{GameScope, PointRepository},
    sessions::GameSessionRepository,
    users::UserRepository,
};
use crate::utils;

const LEADERBOARD_SIZE: i64 = 10;
const RECENT_SESSIONS: i64 = 50;

pub enum GameRequest {
    ListGames {
        response: oneshot::Sender<Result<Vec<Game>, ServiceError>>,
    },
    GetGame {
        id: String,
        response: oneshot::Sender<Result<Game, ServiceError>>,
    },
    CreateGame {
        game: NewGame,
        response: oneshot::Sender<Result<Game, ServiceError>>,
    },
    StartSession {
        user_id: String,
        game_id: String,
        ip_address: Option<String>,
        response: oneshot::Sender<Result<SessionStarted, ServiceError>>,
    },
    EndSession {
        user_id: String,
        session_id: String,
        ip_address: Option<String>,
        response: oneshot::Sender<Result<SessionEnded, ServiceError>>,
    },
    WatchAd {
        user_id: String,
        game_id: String,
        ad_id: Option<String>,
        ip_address: Option<String>,
        response: oneshot::Sender<Result<Award, ServiceError>>,
    },
    MySessions {
        user_id: String,
        response: oneshot::Sender<Result<Vec<GameSession>, ServiceError>>,
    },
    Leaderboard {
        response: oneshot::Sender<Result<Vec<LeaderboardEntry>, ServiceError>>,
    },
    ListAds {
        response: oneshot::Sender<Result<Vec<Ad>, ServiceError>>,
    },
}

/// Validates and stores a new game. Shared with the admin upload endpoint.
pub(super) async fn create_game(
    games: &GameRepository,
    game: NewGame,
) -> Result<Game, ServiceError> {
    let (name, html_path) = match (utils::required(&game.name), utils::required(&game.html_path)) {
        (Some(name), Some(html_path)) => (name, html_path),
        _ => {
            return Err(ServiceError::validation(
                "Game name and file path are required.",
            ))
        }
    };

    let created = games
        .insert_game(
            name,
            game.description.as_deref().unwrap_or(""),
            html_path,
            game.thumbnail.as_deref(),
        )
        .await?;
    log::info!("Game {} ({}) created.", created.id, created.name);

    Ok(created)
}

#[derive(Clone)]
pub struct GameRequestHandler {
    pool: PgPool,
    games: GameRepository,
    sessions: GameSessionRepository,
    users: UserRepository,
    points: PointRepository,
    ads: AdRepository,
    rewards: SharedRewards,
    protection_channel: mpsc::Sender<ProtectionRequest>,
}

impl GameRequestHandler {
    pub fn new(
        pool: PgPool,
        rewards: SharedRewards,
        protection_channel: mpsc::Sender<ProtectionRequest>,
    ) -> Self {
        GameRequestHandler {
            games: GameRepository::new(pool.clone()),
            sessions: GameSessionRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            points: PointRepository::new(pool.clone()),
            ads: AdRepository::new(pool.clone()),
            pool,
            rewards,
            protection_channel,
        }
    }

    async fn get_game(&self, id: &str) -> Result<Game, ServiceError> {
        self.games
            .get_game(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Game"))
    }

    async fn start_session(
        &self,
        user_id: &str,
        game_id: &str,
        ip_address: Option<String>,
    ) -> Result<SessionStarted, ServiceError> {
        let game = self.get_game(game_id).await?;
        ensure_allowed(&self.protection_channel, user_id, ip_address).await?;
        let bonus = self.rewards.read().await.game_start_bonus;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let user = self
            .users
            .lock_user(&mut *tx, user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;

        let played_today = self
            .sessions
            .count_started_since(&mut *tx, user_id, &game.id, utils::start_of_day(now))
            .await?;

        let points_awarded = if played_today == 0 {
            award_if_under_cap(
                &self.points,
                &mut tx,
                &user,
                bonus,
                Activity::PlayGame,
                Some(game.id.as_str()),
                None,
            )
            .await?
            .map(|_| bonus)
            .unwrap_or(0)
        } else {
            0
        };

        let session = self
            .sessions
            .open_session(&mut *tx, user_id, &game.id, now)
            .await?;
        tx.commit().await?;

        Ok(SessionStarted {
            session_id: session.id,
            points_awarded,
        })
    }

    async fn end_session(
        &self,
        user_id: &str,
        session_id: &str,
        ip_address: Option<String>,
    ) -> Result<SessionEnded, ServiceError> {
        ensure_allowed(&self.protection_channel, user_id, ip_address).await?;
        let rewards = self.rewards.read().await.clone();

        let mut tx = self.pool.begin().await?;
        let session = self
            .sessions
            .lock_session(&mut *tx, session_id, user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Game session"))?;
        if session.end_time.is_some() {
            return Err(ServiceError::validation("Game session already ended."));
        }

        let end_time = Utc::now();
        let duration_minutes = sessions::duration_minutes(session.start_time, end_time);
        self.sessions
            .close_session(&mut *tx, session_id, end_time, duration_minutes)
            .await?;

        let mut points_awarded = 0;
        if duration_minutes >= rewards.long_play_minutes {
            let user = self
                .users
                .lock_user(&mut *tx, user_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("User"))?;

            if award_if_under_cap(
                &self.points,
                &mut tx,
                &user,
                rewards.long_play_bonus,
                Activity::PlayGame,
                Some(session.game_id.as_str()),
                None,
            )
            .await?
            .is_some()
            {
                points_awarded = rewards.long_play_bonus;
            }
        }
        tx.commit().await?;

        Ok(SessionEnded {
            duration_minutes,
            points_awarded,
        })
    }

    async fn watch_ad(
        &self,
        user_id: &str,
        game_id: &str,
        ad_id: Option<String>,
        ip_address: Option<String>,
    ) -> Result<Award, ServiceError> {
        let game = self.get_game(game_id).await?;
        ensure_allowed(&self.protection_channel, user_id, ip_address).await?;
        let rewards = self.rewards.read().await.clone();

        record_ad_view(
            &self.pool,
            &self.users,
            &self.points,
            &self.ads,
            &rewards,
            user_id,
            GameScope::Game(&game.id),
            ad_id.as_deref(),
        )
        .await
    }
}

#[async_trait]
impl RequestHandler<GameRequest> for GameRequestHandler {
    async fn handle_request(&self, request: GameRequest) {
        match request {
            GameRequest::ListGames { response } => {
                let result = self.games.list_games().await.map_err(ServiceError::from);
                let _ = response.send(result);
            }
            GameRequest::GetGame { id, response } => {
                let _ = response.send(self.get_game(&id).await);
            }
            GameRequest::CreateGame { game, response } => {
                let _ = response.send(create_game(&self.games, game).await);
            }
            GameRequest::StartSession {
                user_id,
                game_id,
                ip_address,
                response,
            } => {
                let result = self.start_session(&user_id, &game_id, ip_address).await;
                let _ = response.send(result);
            }
            GameRequest::EndSession {
                user_id,
                session_id,
                ip_address,
                response,
            } => {
                let result = self.end_session(&user_id, &session_id, ip_address).await;
                let _ = response.send(result);
            }
            GameRequest::WatchAd {
                user_id,
                game_id,
                ad_id,
                ip_address,
                response,
            } => {
                let result = self.watch_ad(&user_id, &game_id, ad_id, ip_address).await;
                let _ = response.send(result);
            }
            GameRequest::MySessions { user_id, response } => {
                let result = self
                    .sessions
                    .recent_for_user(&user_id, RECENT_SESSIONS)
                    .await
                    .map_err(ServiceError::from);
                let _ = response.send(result);
            }
            GameRequest::Leaderboard { response } => {
                let result = self
                    .users
                    .leaderboard(LEADERBOARD_SIZE)
                    .await
                    .map_err(ServiceError::from);
                let _ = response.send(result);
            }
            GameRequest::ListAds { response } => {
                let result = self.ads.list_ads().await.map_err(ServiceError::from);
                let _ = response.send(result);
            }
        }
    }
}

pub struct GameService;

impl GameService {
    pub fn new() -> Self {
        GameService {}
    }
}

#[async_trait]
impl Service<GameRequest, GameRequestHandler> for GameService {}
