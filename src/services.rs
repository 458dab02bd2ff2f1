use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::settings::{Rewards, Settings};

mod admin;
mod auth;
mod games;
mod http;
mod points;
mod protection;
mod users;

pub type SharedRewards = Arc<RwLock<Rewards>>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0} not found.")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ServiceError::NotFound(what.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ServiceError::Forbidden(msg.into())
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Database(e.to_string())
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(e: anyhow::Error) -> Self {
        ServiceError::Database(e.to_string())
    }
}

/// True when a repository error came from a unique constraint.
pub fn is_unique_violation(e: &anyhow::Error) -> bool {
    e.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|db| db.is_unique_violation())
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Sends a request built around a fresh response channel and awaits the answer.
pub async fn call<R, T>(
    service: &str,
    channel: &mpsc::Sender<R>,
    build: impl FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> R,
) -> Result<T, ServiceError>
where
    R: Send + 'static,
{
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(build(response_tx))
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?;

    response_rx
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?
}

pub async fn start_services(pool: PgPool, settings: Settings) -> Result<(), anyhow::Error> {
    let (user_tx, mut user_rx) = mpsc::channel(512);
    let (game_tx, mut game_rx) = mpsc::channel(512);
    let (point_tx, mut point_rx) = mpsc::channel(512);
    let (admin_tx, mut admin_rx) = mpsc::channel(512);
    let (protection_tx, mut protection_rx) = mpsc::channel(512);

    let rewards: SharedRewards = Arc::new(RwLock::new(settings.rewards.clone()));

    let mut user_service = users::UserService::new();
    let mut game_service = games::GameService::new();
    let mut point_service = points::PointService::new();
    let mut admin_service = admin::AdminService::new();
    let mut protection_service = protection::ProtectionService::new();

    log::info!("Starting protection service.");
    let protection_handler = protection::ProtectionRequestHandler::new(
        pool.clone(),
        settings.protection.clone(),
        rewards.clone(),
    );
    tokio::spawn(async move {
        protection_service
            .run(protection_handler, &mut protection_rx)
            .await;
    });

    log::info!("Starting user service.");
    let user_handler = users::UserRequestHandler::new(pool.clone(), rewards.clone());
    tokio::spawn(async move {
        user_service.run(user_handler, &mut user_rx).await;
    });

    log::info!("Starting game service.");
    let game_handler =
        games::GameRequestHandler::new(pool.clone(), rewards.clone(), protection_tx.clone());
    tokio::spawn(async move {
        game_service.run(game_handler, &mut game_rx).await;
    });

    log::info!("Starting point service.");
    let point_handler =
        points::PointRequestHandler::new(pool.clone(), rewards.clone(), protection_tx.clone());
    tokio::spawn(async move {
        point_service.run(point_handler, &mut point_rx).await;
    });

    log::info!("Starting admin service.");
    let admin_handler = admin::AdminRequestHandler::new(
        pool.clone(),
        rewards.clone(),
        settings.protection.clone(),
    );
    tokio::spawn(async move {
        admin_service.run(admin_handler, &mut admin_rx).await;
    });

    log::info!("Starting HTTP server.");
    let channels = http::Channels {
        users: user_tx,
        games: game_tx,
        points: point_tx,
        admin: admin_tx,
        protection: protection_tx,
    };

    http::start_http_server(&settings.http.listen, &settings.auth, channels).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::models::{
        points::Activity,
        protection::Verdict,
        users::{NewUser, User, BANNED_LEVEL, DEFAULT_LEVEL},
        withdrawals::{NewWithdrawal, WithdrawalDecision, WithdrawalStatus},
    };
    use crate::repositories::{
        points::PointRepository,
        users::{UserRecord, UserRepository},
    };
    use crate::settings::Protection;

    fn record<'a>(email: &'a str, ip_address: Option<&'a str>) -> UserRecord<'a> {
        UserRecord {
            name: "Player",
            email,
            password_hash: "hash",
            phone_number: None,
            google_id: None,
            facebook_id: None,
            daily_points_cap: 50,
            ip_address,
        }
    }

    async fn insert_user(pool: &PgPool, email: &str, ip_address: Option<&str>) -> User {
        UserRepository::new(pool.clone())
            .insert_user(pool, &record(email, ip_address))
            .await
            .unwrap()
    }

    async fn apply_many(
        pool: &PgPool,
        user_id: &str,
        times: usize,
        points: i32,
        activity: Activity,
    ) {
        let ledger = PointRepository::new(pool.clone());
        let mut tx = pool.begin().await.unwrap();
        for _ in 0..times {
            ledger
                .apply(&mut tx, user_id, points, activity, None, None)
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();
    }

    async fn balance_and_ledger(pool: &PgPool, user_id: &str) -> (i64, i64) {
        let balance: i32 = sqlx::query_scalar("SELECT points FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap();
        let ledger: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(points), 0)::BIGINT FROM point_logs WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap();

        (balance as i64, ledger)
    }

    async fn level_of(pool: &PgPool, user_id: &str) -> i32 {
        sqlx::query_scalar("SELECT level FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn shared_rewards() -> SharedRewards {
        Arc::new(RwLock::new(Rewards::default()))
    }

    #[test]
    fn test_plain_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&anyhow::anyhow!("boom")));
        assert!(!is_unique_violation(&anyhow::Error::from(sqlx::Error::RowNotFound)));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires Postgres (DATABASE_URL)"]
    async fn test_three_flags_persist_ban(pool: PgPool) {
        let ip = "198.51.100.7";
        let user = insert_user(&pool, "target@example.com", Some(ip)).await;
        for i in 0..4 {
            insert_user(&pool, &format!("alt{}@example.com", i), Some(ip)).await;
        }
        apply_many(&pool, &user.id, 21, 5, Activity::WatchAd).await;

        let handler = protection::ProtectionRequestHandler::new(
            pool.clone(),
            Protection::default(),
            shared_rewards(),
        );
        let assessment = handler.assess(&user.id, Some(ip.to_string())).await.unwrap();

        assert!(assessment.checks.flag_count() >= 3);
        assert_eq!(assessment.verdict, Verdict::Ban);
        assert_eq!(level_of(&pool, &user.id).await, BANNED_LEVEL);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires Postgres (DATABASE_URL)"]
    async fn test_two_flags_block_without_ban(pool: PgPool) {
        let ip = "198.51.100.8";
        let user = insert_user(&pool, "busy@example.com", Some(ip)).await;
        apply_many(&pool, &user.id, 21, 1, Activity::WatchAd).await;

        let handler = protection::ProtectionRequestHandler::new(
            pool.clone(),
            Protection::default(),
            shared_rewards(),
        );
        let assessment = handler.assess(&user.id, Some(ip.to_string())).await.unwrap();

        assert_eq!(assessment.verdict, Verdict::Block);
        assert_eq!(level_of(&pool, &user.id).await, DEFAULT_LEVEL);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires Postgres (DATABASE_URL)"]
    async fn test_ledger_corrections_are_not_counted_as_actions(pool: PgPool) {
        let user = insert_user(&pool, "corrected@example.com", None).await;
        apply_many(&pool, &user.id, 25, 100, Activity::AdminAdjustment).await;
        apply_many(&pool, &user.id, 1, 5, Activity::WatchAd).await;

        let ledger = PointRepository::new(pool.clone());
        let since = Utc::now() - Duration::minutes(5);
        assert_eq!(ledger.count_since(&user.id, since).await.unwrap(), 1);
        assert_eq!(ledger.log_times_since(&user.id, since).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires Postgres (DATABASE_URL)"]
    async fn test_withdraw_and_refund_keep_ledger_balanced(pool: PgPool) {
        let user = insert_user(&pool, "saver@example.com", None).await;
        apply_many(&pool, &user.id, 1, 5, Activity::WatchAd).await;
        apply_many(&pool, &user.id, 1, 2500, Activity::AdminAdjustment).await;
        assert_eq!(balance_and_ledger(&pool, &user.id).await, (2505, 2505));

        let rewards = shared_rewards();
        let (protection_tx, _protection_rx) = mpsc::channel(1);
        let point_handler =
            points::PointRequestHandler::new(pool.clone(), rewards.clone(), protection_tx);
        let receipt = point_handler
            .withdraw(
                &user.id,
                NewWithdrawal {
                    points: Some(2000),
                    payment_method: Some("payeer".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(receipt.remaining_points, 505);
        assert_eq!(receipt.amount_in_cents, 200);
        assert_eq!(balance_and_ledger(&pool, &user.id).await, (505, 505));

        let admin_handler =
            admin::AdminRequestHandler::new(pool.clone(), rewards, Protection::default());
        let rejected = admin_handler
            .decide_withdrawal(
                "admin-1",
                &receipt.withdrawal_id,
                WithdrawalStatus::Rejected,
                WithdrawalDecision::default(),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, "rejected");
        assert_eq!(balance_and_ledger(&pool, &user.id).await, (2505, 2505));

        let again = admin_handler
            .decide_withdrawal(
                "admin-1",
                &receipt.withdrawal_id,
                WithdrawalStatus::Approved,
                WithdrawalDecision::default(),
            )
            .await;
        assert!(matches!(again, Err(ServiceError::Validation(_))));
        assert_eq!(balance_and_ledger(&pool, &user.id).await, (2505, 2505));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires Postgres (DATABASE_URL)"]
    async fn test_duplicate_email_is_conflict(pool: PgPool) {
        insert_user(&pool, "dup@example.com", None).await;

        let err = UserRepository::new(pool.clone())
            .insert_user(&pool, &record("dup@example.com", None))
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));

        let handler = users::UserRequestHandler::new(pool.clone(), shared_rewards());
        let result = handler
            .register(
                NewUser {
                    name: Some("Second".to_string()),
                    email: Some("dup@example.com".to_string()),
                    password: Some("s3cret!".to_string()),
                    phone_number: None,
                    google_id: None,
                    facebook_id: None,
                    referred_by: None,
                },
                None,
            )
            .await;
        assert!(matches!(result, Err(ServiceError::Conflict(_))));
    }
}
