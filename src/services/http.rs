use std::net::SocketAddr;

use axum::{
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use super::{
    admin::AdminRequest, auth::SessionStore, games::GameRequest, points::PointRequest,
    protection::ProtectionRequest, users::UserRequest, ServiceError,
};
use crate::settings::Auth;

mod admin;
mod auth;
mod extract;
mod games;
mod points;
mod protection;

#[derive(Clone)]
pub struct Channels {
    pub users: mpsc::Sender<UserRequest>,
    pub games: mpsc::Sender<GameRequest>,
    pub points: mpsc::Sender<PointRequest>,
    pub admin: mpsc::Sender<AdminRequest>,
    pub protection: mpsc::Sender<ProtectionRequest>,
}

#[derive(Clone)]
pub struct AppState {
    sessions: SessionStore,
    channels: Channels,
    admin_level: i32,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Database(_)
            | ServiceError::Internal(_)
            | ServiceError::Communication(_, _) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if status.is_server_error() {
            log::error!("Request failed: {}", self);
            "Internal server error.".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Parses an optional JSON body; an empty body yields the default value.
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ServiceError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    serde_json::from_slice(body)
        .map_err(|e| ServiceError::validation(format!("Invalid request body: {}.", e)))
}

fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "OK" })) }))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/check-auth", get(auth::check_auth))
        .route("/games", get(games::list_games).post(games::create_game))
        .route("/games/leaderboard", get(games::leaderboard))
        .route("/games/my-sessions", get(games::my_sessions))
        .route("/games/{id}", get(games::get_game))
        .route("/games/{id}/start-session", post(games::start_session))
        .route("/games/{id}/watch-ad", post(games::watch_ad))
        .route("/games/sessions/{id}/end", post(games::end_session))
        .route("/ads", get(games::list_ads))
        .route("/points/balance", get(points::balance))
        .route("/points/history", get(points::history))
        .route("/points/watch-ad", post(points::watch_ad))
        .route("/points/refer-friend", post(points::refer_friend))
        .route("/points/withdraw", post(points::withdraw))
        .route("/points/withdrawals", get(points::withdrawals))
        .route("/points/stats", get(points::stats))
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/users", get(admin::users))
        .route("/admin/users/{id}", get(admin::user_details))
        .route("/admin/users/{id}/points", post(admin::adjust_points))
        .route("/admin/users/{id}/ban", post(admin::ban_user))
        .route("/admin/withdrawals", get(admin::withdrawals))
        .route("/admin/withdrawals/{id}/approve", post(admin::approve_withdrawal))
        .route("/admin/withdrawals/{id}/reject", post(admin::reject_withdrawal))
        .route("/admin/games/upload", post(admin::upload_game))
        .route("/admin/suspicious-activity", get(admin::suspicious_activity))
        .route(
            "/admin/settings",
            get(admin::get_settings).post(admin::update_settings),
        )
        .route("/protection/validate-action", post(protection::validate_action))
        .route("/protection/auto-block-check", post(protection::auto_block_check))
        .route("/protection/device-info", post(protection::device_info))
        .route(
            "/protection/check-daily-limits",
            get(protection::check_daily_limits),
        )
        .route(
            "/protection/verify-ad-completion",
            post(protection::verify_ad_completion),
        )
        .route(
            "/protection/report-suspicious",
            post(protection::report_suspicious),
        );

    Router::new()
        .nest("/api", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(
    listen: &str,
    auth: &Auth,
    channels: Channels,
) -> Result<(), anyhow::Error> {
    let app_state = AppState {
        sessions: SessionStore::new(auth.token_ttl_hours),
        channels,
        admin_level: auth.admin_level,
    };

    let app = router(app_state);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use tower::ServiceExt;

    use crate::models::users::User;

    struct Receivers {
        users: mpsc::Receiver<UserRequest>,
        _games: mpsc::Receiver<GameRequest>,
        _points: mpsc::Receiver<PointRequest>,
        _admin: mpsc::Receiver<AdminRequest>,
        _protection: mpsc::Receiver<ProtectionRequest>,
    }

    fn test_app() -> (Router, SessionStore, Receivers) {
        let (users, users_rx) = mpsc::channel(1);
        let (games, _games) = mpsc::channel(1);
        let (points, _points) = mpsc::channel(1);
        let (admin, _admin) = mpsc::channel(1);
        let (protection, _protection) = mpsc::channel(1);
        let sessions = SessionStore::new(1);

        let state = AppState {
            sessions: sessions.clone(),
            channels: Channels {
                users,
                games,
                points,
                admin,
                protection,
            },
            admin_level: 10,
        };

        (
            router(state),
            sessions,
            Receivers {
                users: users_rx,
                _games,
                _points,
                _admin,
                _protection,
            },
        )
    }

    fn user_with_level(id: &str, level: i32) -> User {
        let now = Utc::now();
        User {
            id: id.to_string(),
            name: "Player".to_string(),
            email: format!("{}@example.com", id),
            password_hash: String::new(),
            phone_number: None,
            google_id: None,
            facebook_id: None,
            points: 0,
            daily_points_cap: 50,
            level,
            ip_address: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Answers every user lookup with a user at the given level.
    fn serve_users(mut users: mpsc::Receiver<UserRequest>, level: i32) {
        tokio::spawn(async move {
            while let Some(request) = users.recv().await {
                if let UserRequest::GetUser { id, response } = request {
                    let _ = response.send(Ok(Some(user_with_level(&id, level))));
                }
            }
        });
    }

    async fn status_of(app: Router, method: &str, uri: &str, auth: Option<&str>) -> StatusCode {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = auth {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        app.oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _sessions, _receivers) = test_app();
        assert_eq!(status_of(app, "GET", "/api/health", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_need_token() {
        let (app, _sessions, _receivers) = test_app();
        for (method, uri) in [
            ("GET", "/api/auth/me"),
            ("POST", "/api/games"),
            ("GET", "/api/points/balance"),
            ("POST", "/api/points/withdraw"),
            ("GET", "/api/games/my-sessions"),
            ("GET", "/api/admin/dashboard"),
            ("GET", "/api/protection/check-daily-limits"),
        ] {
            assert_eq!(
                status_of(app.clone(), method, uri, None).await,
                StatusCode::UNAUTHORIZED,
                "{} {}",
                method,
                uri
            );
        }
    }

    #[tokio::test]
    async fn test_game_creation_requires_admin() {
        let (app, sessions, receivers) = test_app();
        serve_users(receivers.users, 1);
        let token = sessions.create("player-1");

        assert_eq!(
            status_of(app.clone(), "POST", "/api/games", Some(&token)).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(app, "POST", "/api/admin/games/upload", Some(&token)).await,
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn test_admin_passes_game_creation_gate() {
        let (app, sessions, receivers) = test_app();
        serve_users(receivers.users, 10);
        let token = sessions.create("admin-1");

        // past the admin check, the missing JSON body is what gets rejected
        assert_eq!(
            status_of(app, "POST", "/api/games", Some(&token)).await,
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected() {
        let (app, _sessions, _receivers) = test_app();
        assert_eq!(
            status_of(app, "GET", "/api/points/stats", Some("nope")).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_check_auth_without_token() {
        let (app, _sessions, _receivers) = test_app();
        assert_eq!(
            status_of(app, "GET", "/api/auth/check-auth", None).await,
            StatusCode::OK
        );
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ServiceError::validation("bad"), StatusCode::BAD_REQUEST),
            (
                ServiceError::Unauthorized("no".to_string()),
                StatusCode::UNAUTHORIZED,
            ),
            (ServiceError::forbidden("banned"), StatusCode::FORBIDDEN),
            (ServiceError::not_found("Game"), StatusCode::NOT_FOUND),
            (
                ServiceError::Conflict("dup".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::Database("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServiceError::Communication("Users".to_string(), "closed".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_optional_json_body() {
        let empty: crate::models::ads::AdView = optional_json(&Bytes::new()).unwrap();
        assert!(empty.ad_id.is_none());

        let parsed: crate::models::ads::AdView =
            optional_json(&Bytes::from_static(br#"{"ad_id":"ad-7"}"#)).unwrap();
        assert_eq!(parsed.ad_id.as_deref(), Some("ad-7"));

        let broken = optional_json::<crate::models::ads::AdView>(&Bytes::from_static(b"{"));
        assert!(matches!(broken, Err(ServiceError::Validation(_))));
    }
}
