use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{map_insert_error, StoreResult};
use crate::models::auth_state::AuthState;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthStateRepository: Send + Sync {
    async fn insert(&self, state: &AuthState) -> StoreResult<()>;

    /// Get-then-delete in one step; a state can be consumed exactly once.
    async fn take(&self, state: &str) -> StoreResult<Option<AuthState>>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[derive(Clone)]
pub struct PgAuthStateRepository {
    pool: PgPool,
}

impl PgAuthStateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthStateRepository for PgAuthStateRepository {
    async fn insert(&self, state: &AuthState) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO auth_states (state, redirect_uri, provider, nonce, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&state.state)
        .bind(&state.redirect_uri)
        .bind(&state.provider)
        .bind(&state.nonce)
        .bind(state.created_at)
        .bind(state.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "auth state"))?;
        Ok(())
    }

    async fn take(&self, state: &str) -> StoreResult<Option<AuthState>> {
        let row = sqlx::query_as::<_, AuthState>(
            "DELETE FROM auth_states WHERE state = $1 \
             RETURNING state, redirect_uri, provider, nonce, created_at, expires_at",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM auth_states WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
