use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::extract::AdminUser;
use super::{optional_json, AppState};
use crate::models::{
    games::NewGame,
    users::{BanRequest, PointAdjustment},
    withdrawals::{WithdrawalDecision, WithdrawalFilter},
    PageQuery,
};
use crate::services::{admin::AdminRequest, call, ServiceError};

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    search: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
}

pub async fn dashboard(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<impl IntoResponse, ServiceError> {
    let dashboard = call("Admin", &state.channels.admin, |response| {
        AdminRequest::Dashboard { response }
    })
    .await?;

    Ok(Json(dashboard))
}

pub async fn users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let users = call("Admin", &state.channels.admin, |response| AdminRequest::Users {
        search: query.search,
        page: PageQuery {
            page: query.page,
            per_page: query.per_page,
        },
        response,
    })
    .await?;

    Ok(Json(users))
}

pub async fn user_details(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let activity = call("Admin", &state.channels.admin, |response| {
        AdminRequest::UserActivity { id, response }
    })
    .await?;

    Ok(Json(activity))
}

pub async fn adjust_points(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    Json(adjustment): Json<PointAdjustment>,
) -> Result<impl IntoResponse, ServiceError> {
    let award = call("Admin", &state.channels.admin, |response| {
        AdminRequest::AdjustPoints {
            admin_id: admin.id,
            id,
            adjustment,
            response,
        }
    })
    .await?;

    Ok(Json(json!({
        "message": "Points adjusted.",
        "points_adjusted": award.points_awarded,
        "total_points": award.total_points
    })))
}

pub async fn ban_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    Json(request): Json<BanRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let banned = request.banned;
    let user = call("Admin", &state.channels.admin, |response| AdminRequest::Ban {
        admin_id: admin.id,
        id,
        request,
        response,
    })
    .await?;

    let message = if banned {
        "User banned."
    } else {
        "User unbanned."
    };

    Ok(Json(json!({ "message": message, "user": user })))
}

pub async fn withdrawals(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(filter): Query<WithdrawalFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let withdrawals = call("Admin", &state.channels.admin, |response| {
        AdminRequest::Withdrawals { filter, response }
    })
    .await?;

    Ok(Json(withdrawals))
}

pub async fn approve_withdrawal(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let decision: WithdrawalDecision = optional_json(&body)?;

    let withdrawal = call("Admin", &state.channels.admin, |response| {
        AdminRequest::ApproveWithdrawal {
            admin_id: admin.id,
            id,
            decision,
            response,
        }
    })
    .await?;

    Ok(Json(json!({
        "message": "Withdrawal approved.",
        "withdrawal": withdrawal
    })))
}

pub async fn reject_withdrawal(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let decision: WithdrawalDecision = optional_json(&body)?;

    let withdrawal = call("Admin", &state.channels.admin, |response| {
        AdminRequest::RejectWithdrawal {
            admin_id: admin.id,
            id,
            decision,
            response,
        }
    })
    .await?;

    Ok(Json(json!({
        "message": "Withdrawal rejected and points refunded.",
        "withdrawal": withdrawal
    })))
}

pub async fn upload_game(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(game): Json<NewGame>,
) -> Result<impl IntoResponse, ServiceError> {
    let game = call("Admin", &state.channels.admin, |response| {
        AdminRequest::UploadGame { game, response }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "game": game }))))
}

pub async fn suspicious_activity(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<impl IntoResponse, ServiceError> {
    let report = call("Admin", &state.channels.admin, |response| {
        AdminRequest::SuspiciousActivity { response }
    })
    .await?;

    Ok(Json(report))
}

pub async fn get_settings(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<impl IntoResponse, ServiceError> {
    let settings = call("Admin", &state.channels.admin, |response| {
        AdminRequest::GetSettings { response }
    })
    .await?;

    Ok(Json(json!({ "settings": settings })))
}

pub async fn update_settings(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(patch): Json<Value>,
) -> Result<impl IntoResponse, ServiceError> {
    let settings = call("Admin", &state.channels.admin, |response| {
        AdminRequest::UpdateSettings {
            admin_id: admin.id,
            patch,
            response,
        }
    })
    .await?;

    Ok(Json(json!({
        "message": "Settings updated.",
        "settings": settings
    })))
}
