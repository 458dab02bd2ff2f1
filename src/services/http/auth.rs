use axum::{extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use super::extract::{bearer_token, AuthUser, ClientInfo};
use super::AppState;
use crate::models::users::{Credentials, NewUser};
use crate::services::{call, users::UserRequest, ServiceError};

pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(user): Json<NewUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = call("Users", &state.channels.users, |response| {
        UserRequest::Register {
            user,
            ip_address: client.ip_address,
            response,
        }
    })
    .await?;

    let token = state.sessions.create(&user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful.",
            "token": token,
            "user": user
        })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(credentials): Json<Credentials>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = call("Users", &state.channels.users, |response| UserRequest::Login {
        credentials,
        ip_address: client.ip_address,
        response,
    })
    .await?;

    let token = state.sessions.create(&user.id);

    Ok(Json(json!({
        "message": "Login successful.",
        "token": token,
        "user": user
    })))
}

pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> impl IntoResponse {
    state.sessions.revoke(&auth.token);

    Json(json!({ "message": "Logged out." }))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let user = call("Users", &state.channels.users, |response| {
        UserRequest::Profile {
            id: auth.id,
            response,
        }
    })
    .await?;

    Ok(Json(json!({ "user": user })))
}

/// Reports whether the bearer token is live without rejecting anonymous callers.
pub async fn check_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let user_id = match bearer_token(&headers).and_then(|token| state.sessions.resolve(token)) {
        Some(user_id) => user_id,
        None => return Ok(Json(json!({ "authenticated": false }))),
    };

    let user = call("Users", &state.channels.users, |response| {
        UserRequest::Profile {
            id: user_id,
            response,
        }
    })
    .await?;

    Ok(Json(json!({ "authenticated": true, "user": user })))
}
