//! Operator endpoints, guarded by the static admin token.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::service_principal::{BindServicePrincipalRequest, ServicePrincipal},
    state::AppState,
    types::RealmId,
};

pub async fn delete_realm(
    State(state): State<AppState>,
    Path(realm_id): Path<RealmId>,
) -> Result<StatusCode, AppError> {
    state.realms.delete_realm(realm_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn bind_service_principal(
    State(state): State<AppState>,
    Json(payload): Json<BindServicePrincipalRequest>,
) -> Result<(StatusCode, Json<ServicePrincipal>), AppError> {
    payload.validate()?;
    let principal = state
        .realms
        .bind_service_principal(payload.service_principal_id.trim(), payload.realm_id)
        .await?;
    Ok((StatusCode::CREATED, Json(principal)))
}
