use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use super::extract::{AuthUser, ClientInfo};
use super::{optional_json, AppState};
use crate::models::{
    ads::AdView, referrals::ReferralAction, withdrawals::NewWithdrawal, PageQuery,
};
use crate::services::{call, points::PointRequest, ServiceError};

pub async fn balance(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let balance = call("Points", &state.channels.points, |response| {
        PointRequest::Balance {
            user_id: auth.id,
            response,
        }
    })
    .await?;

    Ok(Json(balance))
}

pub async fn history(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let history = call("Points", &state.channels.points, |response| {
        PointRequest::History {
            user_id: auth.id,
            page,
            response,
        }
    })
    .await?;

    Ok(Json(history))
}

pub async fn watch_ad(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let view: AdView = optional_json(&body)?;

    let award = call("Points", &state.channels.points, |response| {
        PointRequest::WatchAd {
            user_id: auth.id,
            ip_address: client.ip_address,
            ad_id: view.ad_id,
            response,
        }
    })
    .await?;

    Ok(Json(award))
}

pub async fn refer_friend(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Json(action): Json<ReferralAction>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = call("Points", &state.channels.points, |response| {
        PointRequest::Refer {
            user_id: auth.id,
            ip_address: client.ip_address,
            action,
            response,
        }
    })
    .await?;

    Ok(Json(outcome))
}

pub async fn withdraw(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<NewWithdrawal>,
) -> Result<impl IntoResponse, ServiceError> {
    let receipt = call("Points", &state.channels.points, |response| {
        PointRequest::Withdraw {
            user_id: auth.id,
            request,
            response,
        }
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Withdrawal request submitted.",
            "withdrawal_id": receipt.withdrawal_id,
            "amount_in_cents": receipt.amount_in_cents,
            "remaining_points": receipt.remaining_points
        })),
    ))
}

pub async fn withdrawals(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let withdrawals = call("Points", &state.channels.points, |response| {
        PointRequest::Withdrawals {
            user_id: auth.id,
            response,
        }
    })
    .await?;

    Ok(Json(json!({ "withdrawals": withdrawals })))
}

pub async fn stats(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let stats = call("Points", &state.channels.points, |response| {
        PointRequest::Stats {
            user_id: auth.id,
            response,
        }
    })
    .await?;

    Ok(Json(stats))
}
