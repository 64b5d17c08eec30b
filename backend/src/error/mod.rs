use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::repositories::StoreError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Failures raised by the credential-issuance core.
///
/// Credential-resolution failures are surfaced immediately and never retried.
/// Gateway failures are transient from the caller's point of view and the
/// caller is expected to retry.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("no credentials supplied")]
    NoCredentials,
    #[error("invalid or expired session")]
    InvalidSession,
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("API key expired")]
    ApiKeyExpired,
    #[error("realm not found")]
    RealmNotFound,
    #[error("no realm for owner")]
    NoRealmForOwner,
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("code already used")]
    CodeAlreadyUsed,
    #[error("device request not found")]
    DeviceRequestNotFound,
    #[error("malformed device or user code")]
    InvalidCodeFormat,
    #[error("invalid login state")]
    InvalidStateOrCsrf,
    #[error("service account not found")]
    ServiceAccountNotFound,
    #[error("identity token rejected: {0}")]
    InvalidIdentityToken(String),
    #[error("API key not found")]
    ApiKeyNotFound,
    #[error("node not found")]
    NodeNotFound,
    #[error("mesh gateway unavailable: {0}")]
    MeshGatewayUnavailable(String),
    #[error("identity gateway unavailable: {0}")]
    IdentityGatewayUnavailable(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    BadRequest(String),
    BadGateway(String),
    InternalServerError(anyhow::Error),
    Validation(Vec<String>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code, details) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND".to_string(), None),
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                msg,
                "UNAUTHORIZED".to_string(),
                None,
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "FORBIDDEN".to_string(), None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, "CONFLICT".to_string(), None),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                msg,
                "BAD_REQUEST".to_string(),
                None,
            ),
            AppError::BadGateway(msg) => {
                tracing::error!(error = %msg, "Upstream collaborator failure");
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream service unavailable".to_string(),
                    "BAD_GATEWAY".to_string(),
                    None,
                )
            }
            AppError::InternalServerError(err) => {
                tracing::error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "INTERNAL_SERVER_ERROR".to_string(),
                    None,
                )
            }
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                "VALIDATION_ERROR".to_string(),
                Some(serde_json::json!({ "errors": errors })),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code,
            details,
        });

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NoCredentials
            | CoreError::InvalidSession
            | CoreError::InvalidApiKey
            | CoreError::ApiKeyExpired
            | CoreError::InvalidOrExpiredToken
            | CoreError::InvalidIdentityToken(_) => AppError::Unauthorized(err.to_string()),
            CoreError::NoRealmForOwner
            | CoreError::InvalidStateOrCsrf
            | CoreError::ServiceAccountNotFound => AppError::Forbidden(err.to_string()),
            CoreError::RealmNotFound
            | CoreError::DeviceRequestNotFound
            | CoreError::ApiKeyNotFound
            | CoreError::NodeNotFound => AppError::NotFound(err.to_string()),
            CoreError::CodeAlreadyUsed | CoreError::InvalidCodeFormat => {
                AppError::BadRequest(err.to_string())
            }
            CoreError::Validation(msg) => AppError::Validation(vec![msg]),
            CoreError::MeshGatewayUnavailable(_) | CoreError::IdentityGatewayUnavailable(_) => {
                AppError::BadGateway(err.to_string())
            }
            CoreError::Store(inner) => AppError::InternalServerError(inner.into()),
            CoreError::Internal(inner) => AppError::InternalServerError(inner),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::InternalServerError(err.into()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let code = e.code.as_ref();
                    format!("{}: {}", field, code)
                })
            })
            .collect();
        AppError::Validation(messages)
    }
}
