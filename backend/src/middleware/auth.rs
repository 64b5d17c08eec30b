use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::{
    error::{AppError, CoreError},
    state::AppState,
    utils::cookies::{extract_cookie_value, SESSION_COOKIE_NAME},
};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Session or API key. Inserts [`crate::services::auth::AuthContext`].
pub async fn require_any(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let credential = extract_credential(request.headers());
    let ctx = state.auth.authenticate(credential.as_deref()).await?;
    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// Session only; for endpoints that mint further credentials.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let credential = extract_credential(request.headers());
    let ctx = state.auth.session_only(credential.as_deref()).await?;
    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// API key only; for automation endpoints.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let credential = extract_credential(request.headers());
    let ctx = state.auth.api_key_only(credential.as_deref()).await?;
    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// Operator routes. Refuses everything when no admin token is configured.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Err(AppError::Forbidden("Admin API disabled".to_string()));
    };
    let presented = request
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .or_else(|| {
            request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_bearer_token)
        })
        .ok_or_else(|| AppError::from(CoreError::NoCredentials))?;

    if !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(AppError::Unauthorized("Invalid admin token".to_string()));
    }
    Ok(next.run(request).await)
}

fn parse_bearer_token(header: &str) -> Option<&str> {
    let (scheme, rest) = header.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        let token = rest.trim();
        (!token.is_empty()).then_some(token)
    } else {
        None
    }
}

/// Bearer header, then `X-API-Key`, then the session cookie.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer_token)
        .map(str::to_owned);
    if bearer.is_some() {
        return bearer;
    }

    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned);
    if api_key.is_some() {
        return api_key;
    }

    headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| extract_cookie_value(raw, SESSION_COOKIE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(parse_bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer_token("bearer abc"), Some("abc"));
        assert_eq!(parse_bearer_token("BEARER  abc "), Some("abc"));
        assert_eq!(parse_bearer_token("Basic abc"), None);
        assert_eq!(parse_bearer_token("Bearer "), None);
    }

    #[test]
    fn bearer_wins_over_other_sources() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("mrk_key"));
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("meshrealm_session=from-cookie"),
        );
        assert_eq!(extract_credential(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn api_key_header_then_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; meshrealm_session=from-cookie"),
        );
        assert_eq!(extract_credential(&headers).as_deref(), Some("from-cookie"));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("mrk_key"));
        assert_eq!(extract_credential(&headers).as_deref(), Some("mrk_key"));
    }

    #[test]
    fn no_credential_sources() {
        assert_eq!(extract_credential(&HeaderMap::new()), None);
    }
}
