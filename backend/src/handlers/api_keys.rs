use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::api_key::{ApiKeyResponse, CreateApiKeyRequest, CreateApiKeyResponse},
    services::auth::{AuthContext, AuthMethod},
    state::AppState,
    types::ApiKeyId,
};

pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<CreateApiKeyResponse>), AppError> {
    payload.validate()?;
    let (api_key, key) = state.auth.create_api_key(ctx.realm_id(), &payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse {
            api_key: api_key.into(),
            key,
        }),
    ))
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Vec<ApiKeyResponse>>, AppError> {
    let keys = state.auth.list_api_keys(ctx.realm_id()).await?;
    Ok(Json(keys.into_iter().map(ApiKeyResponse::from).collect()))
}

pub async fn delete_api_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<ApiKeyId>,
) -> Result<StatusCode, AppError> {
    state.auth.delete_api_key(ctx.realm_id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Metadata of the key making the call.
pub async fn current_api_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<ApiKeyResponse>, AppError> {
    let AuthMethod::ApiKey { key_id } = ctx.method else {
        return Err(AppError::Unauthorized("API key required".into()));
    };
    let key = state.auth.get_api_key(ctx.realm.id, key_id).await?;
    Ok(Json(key.into()))
}
