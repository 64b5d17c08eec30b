use axum::{
    extract::{Extension, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::AppError,
    models::session::{IdTokenLoginRequest, SessionTokenResponse},
    services::auth::AuthContext,
    state::AppState,
    utils::cookies::{build_clear_session_cookie, build_session_cookie, CookieOptions},
};

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct LoginQuery {
    /// Local path to return to after login.
    pub return_to: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<Redirect, AppError> {
    let url = state.login.begin(query.return_to.as_deref()).await?;
    Ok(Redirect::to(&url))
}

pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, AppError> {
    if let Some(error) = query.error {
        tracing::info!(
            error = %error,
            description = query.error_description.as_deref().unwrap_or(""),
            "Identity provider refused login"
        );
        return Err(AppError::Unauthorized("Login was not completed".into()));
    }
    let (Some(code), Some(login_state)) = (query.code, query.state) else {
        return Err(AppError::BadRequest("code and state are required".into()));
    };

    let outcome = state.login.complete(&code, &login_state).await?;
    let max_age = (outcome.session.expires_at - Utc::now())
        .to_std()
        .unwrap_or_default();
    let cookie = build_session_cookie(
        &outcome.session.id,
        max_age,
        CookieOptions::from(state.config.as_ref()),
    );

    Ok((
        [(header::SET_COOKIE, cookie)],
        Redirect::to(&outcome.return_to),
    )
        .into_response())
}

/// Machine login with an ID token obtained directly from the provider.
pub async fn token(
    State(state): State<AppState>,
    Json(payload): Json<IdTokenLoginRequest>,
) -> Result<Json<SessionTokenResponse>, AppError> {
    payload.validate()?;
    let outcome = state.login.with_id_token(&payload.id_token).await?;
    Ok(Json(outcome.session.into()))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Response, AppError> {
    if let Some(session_id) = ctx.session_id() {
        state.auth.logout(session_id).await?;
    }
    let cookie = build_clear_session_cookie(CookieOptions::from(state.config.as_ref()));
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response())
}
