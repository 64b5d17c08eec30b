use axum::{
    extract::{Extension, State},
    Json,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::join_token::{
        CreateJoinTokenRequest, JoinTokenInspection, JoinTokenPayload, JoinTokenResponse,
        WorkerJoinResponse,
    },
    services::auth::AuthContext,
    state::AppState,
};

pub async fn create_join_token(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<CreateJoinTokenRequest>,
) -> Result<Json<JoinTokenResponse>, AppError> {
    payload.validate()?;
    let (token, claims) = state.join_tokens.generate(&ctx.realm, payload.ttl)?;
    let expires_at = claims
        .expires_at()
        .ok_or_else(|| anyhow::anyhow!("join token expiry out of range"))?;
    Ok(Json(JoinTokenResponse { token, expires_at }))
}

/// Decodes a token without verifying it, so a UI can show what it is about
/// to submit. Nothing here is trusted.
pub async fn inspect_join_token(
    State(state): State<AppState>,
    Json(payload): Json<JoinTokenPayload>,
) -> Result<Json<JoinTokenInspection>, AppError> {
    Ok(Json(state.join_tokens.inspect(&payload.token)?))
}

pub async fn worker_join(
    State(state): State<AppState>,
    Json(payload): Json<JoinTokenPayload>,
) -> Result<Json<WorkerJoinResponse>, AppError> {
    let credential = state.join_tokens.exchange(&payload.token).await?;
    Ok(Json(WorkerJoinResponse {
        credential,
        coordinator_url: state.join_tokens.coordinator_url().to_string(),
    }))
}
