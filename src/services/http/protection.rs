use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::extract::{AuthUser, ClientInfo};
use super::{optional_json, AppState};
use crate::models::protection::{
    ActionCheck, AdCompletion, Assessment, DeviceInfo, SuspiciousReport, Verdict,
};
use crate::services::{call, protection::ProtectionRequest, ServiceError};

async fn assess(
    state: &AppState,
    user_id: String,
    ip_address: Option<String>,
) -> Result<Assessment, ServiceError> {
    call("Protection", &state.channels.protection, |response| {
        ProtectionRequest::Assess {
            user_id,
            ip_address,
            response,
        }
    })
    .await
}

pub async fn validate_action(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    body: Bytes,
) -> Result<Response, ServiceError> {
    let check: ActionCheck = optional_json(&body)?;
    let assessment = assess(&state, auth.id.clone(), client.ip_address).await?;

    log::debug!(
        "Validated {:?} for user {}: {:?}",
        check.action_type,
        auth.id,
        assessment.verdict
    );

    if !assessment.verdict.is_allowed() {
        return Ok((
            StatusCode::FORBIDDEN,
            Json(json!({
                "allowed": false,
                "reason": "Suspicious activity detected.",
                "checks": assessment.checks
            })),
        )
            .into_response());
    }

    let warning = match assessment.verdict {
        Verdict::Warn => Some("Unusual activity detected."),
        _ => None,
    };

    Ok(Json(json!({
        "allowed": true,
        "warning": warning,
        "checks": assessment.checks
    }))
    .into_response())
}

pub async fn auto_block_check(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
) -> Result<Response, ServiceError> {
    let assessment = assess(&state, auth.id, client.ip_address).await?;
    let issues = assessment.checks.issues();

    if assessment.verdict == Verdict::Ban {
        return Ok((
            StatusCode::FORBIDDEN,
            Json(json!({
                "blocked": true,
                "reason": "Account has been banned for suspicious activity.",
                "issues": issues
            })),
        )
            .into_response());
    }

    Ok(Json(json!({
        "blocked": false,
        "warning": !issues.is_empty(),
        "issues": issues
    }))
    .into_response())
}

pub async fn device_info(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let device: DeviceInfo = optional_json(&body)?;

    let fingerprint = call("Protection", &state.channels.protection, |response| {
        ProtectionRequest::RegisterDevice {
            user_id: auth.id,
            ip_address: client.ip_address,
            user_agent: client.user_agent,
            device,
            response,
        }
    })
    .await?;

    Ok(Json(json!({
        "message": "Device info recorded.",
        "fingerprint": fingerprint
    })))
}

pub async fn check_daily_limits(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let limits = call("Protection", &state.channels.protection, |response| {
        ProtectionRequest::DailyLimits {
            user_id: auth.id,
            response,
        }
    })
    .await?;

    Ok(Json(limits))
}

pub async fn verify_ad_completion(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(completion): Json<AdCompletion>,
) -> Result<Response, ServiceError> {
    let verification = call("Protection", &state.channels.protection, |response| {
        ProtectionRequest::VerifyAdCompletion {
            user_id: auth.id,
            completion,
            response,
        }
    })
    .await?;

    let status = if verification.verified {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };

    Ok((status, Json(verification)).into_response())
}

pub async fn report_suspicious(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(report): Json<SuspiciousReport>,
) -> Result<impl IntoResponse, ServiceError> {
    call("Protection", &state.channels.protection, |response| {
        ProtectionRequest::Report {
            user_id: auth.id,
            report,
            response,
        }
    })
    .await?;

    Ok(Json(json!({ "message": "Report submitted." })))
}
