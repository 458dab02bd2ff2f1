use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use super::extract::{AdminUser, AuthUser, ClientInfo};
use super::{optional_json, AppState};
use crate::models::{ads::AdView, games::NewGame};
use crate::services::{call, games::GameRequest, ServiceError};

pub async fn list_games(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let games = call("Games", &state.channels.games, |response| {
        GameRequest::ListGames { response }
    })
    .await?;

    Ok(Json(json!({ "games": games })))
}

pub async fn get_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let game = call("Games", &state.channels.games, |response| GameRequest::GetGame {
        id,
        response,
    })
    .await?;

    Ok(Json(json!({ "game": game })))
}

pub async fn create_game(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(game): Json<NewGame>,
) -> Result<impl IntoResponse, ServiceError> {
    let game = call("Games", &state.channels.games, |response| {
        GameRequest::CreateGame { game, response }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "game": game }))))
}

pub async fn start_session(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Path(game_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let started = call("Games", &state.channels.games, |response| {
        GameRequest::StartSession {
            user_id: auth.id,
            game_id,
            ip_address: client.ip_address,
            response,
        }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(started)))
}

pub async fn end_session(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let ended = call("Games", &state.channels.games, |response| {
        GameRequest::EndSession {
            user_id: auth.id,
            session_id,
            ip_address: client.ip_address,
            response,
        }
    })
    .await?;

    Ok(Json(ended))
}

pub async fn watch_ad(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Path(game_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let view: AdView = optional_json(&body)?;

    let award = call("Games", &state.channels.games, |response| {
        GameRequest::WatchAd {
            user_id: auth.id,
            game_id,
            ad_id: view.ad_id,
            ip_address: client.ip_address,
            response,
        }
    })
    .await?;

    Ok(Json(award))
}

pub async fn my_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let sessions = call("Games", &state.channels.games, |response| {
        GameRequest::MySessions {
            user_id: auth.id,
            response,
        }
    })
    .await?;

    Ok(Json(json!({ "sessions": sessions })))
}

pub async fn leaderboard(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let leaderboard = call("Games", &state.channels.games, |response| {
        GameRequest::Leaderboard { response }
    })
    .await?;

    Ok(Json(json!({ "leaderboard": leaderboard })))
}

pub async fn list_ads(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let ads = call("Games", &state.channels.games, |response| GameRequest::ListAds {
        response,
    })
    .await?;

    Ok(Json(json!({ "ads": ads })))
}
