//! Device authorization endpoints.
//!
//! `/device/code` and `/device/token` are unauthenticated and called by the
//! worker; `/device/verify` is called by a logged-in human.

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppError,
    models::device_request::{
        DeviceCodeResponse, DeviceStatus, DeviceTokenRequest, DeviceVerifyAction,
        DeviceVerifyRequest, DeviceVerifyResponse, PollOutcome,
    },
    models::join_token::WorkerJoinResponse,
    services::auth::AuthContext,
    state::AppState,
};

/// RFC 8628 section 3.5 error body.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceTokenError {
    pub error: String,
}

pub async fn device_code(
    State(state): State<AppState>,
) -> Result<Json<DeviceCodeResponse>, AppError> {
    Ok(Json(state.devices.initiate().await?))
}

pub async fn device_verify(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<DeviceVerifyRequest>,
) -> Result<Json<DeviceVerifyResponse>, AppError> {
    let status = match payload.action {
        DeviceVerifyAction::Approve => {
            state.devices.approve(&payload.user_code, &ctx.realm).await?;
            DeviceStatus::Approved
        }
        DeviceVerifyAction::Deny => {
            state.devices.deny(&payload.user_code, &ctx.realm).await?;
            DeviceStatus::Denied
        }
    };
    Ok(Json(DeviceVerifyResponse { status }))
}

pub async fn device_token(
    State(state): State<AppState>,
    Json(payload): Json<DeviceTokenRequest>,
) -> Result<Response, AppError> {
    let response = match state.devices.poll(&payload.device_code).await? {
        PollOutcome::Approved(credential) => Json(WorkerJoinResponse {
            credential,
            coordinator_url: state.join_tokens.coordinator_url().to_string(),
        })
        .into_response(),
        PollOutcome::AuthorizationPending => {
            token_error(StatusCode::ACCEPTED, "authorization_pending")
        }
        PollOutcome::AccessDenied => token_error(StatusCode::FORBIDDEN, "access_denied"),
        PollOutcome::ExpiredToken => token_error(StatusCode::GONE, "expired_token"),
    };
    Ok(response)
}

fn token_error(status: StatusCode, error: &str) -> Response {
    let body = DeviceTokenError {
        error: error.to_string(),
    };
    (status, Json(body)).into_response()
}
