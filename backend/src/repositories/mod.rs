//! Persistence contracts for realms and credentials.
//!
//! Every store is a trait with a Postgres implementation and an in-memory
//! implementation (single instance only, used for development and tests).
//! Correctness never depends on high write concurrency: conditional updates
//! carry the expected current state, so a one-writer store is sufficient.

pub mod api_key;
pub mod auth_state;
pub mod device_request;
pub mod memory;
pub mod realm;
pub mod service_principal;
pub mod session;

pub use api_key::*;
pub use auth_state::*;
pub use device_request::*;
pub use realm::*;
pub use service_principal::*;
pub use session::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("unique constraint violated: {0}")]
    Conflict(&'static str),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Turns a unique-constraint violation into [`StoreError::Conflict`].
pub(crate) fn map_insert_error(err: sqlx::Error, what: &'static str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(what),
        _ => StoreError::Database(err),
    }
}
