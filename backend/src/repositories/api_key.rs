//! API key repository. Lookup is always by hash, never by display prefix.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{map_insert_error, StoreResult};
use crate::models::api_key::ApiKey;
use crate::types::{ApiKeyId, RealmId};

const SELECT_COLUMNS: &str =
    "id, realm_id, name, key_hash, key_prefix, created_at, expires_at, last_used_at";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn insert(&self, key: &ApiKey) -> StoreResult<()>;

    async fn find_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKey>>;

    async fn find_for_realm(&self, realm_id: RealmId, id: ApiKeyId)
        -> StoreResult<Option<ApiKey>>;

    /// Newest first.
    async fn list_for_realm(&self, realm_id: RealmId) -> StoreResult<Vec<ApiKey>>;

    /// Deletes only if the key belongs to `realm_id`.
    async fn delete_for_realm(&self, realm_id: RealmId, id: ApiKeyId) -> StoreResult<bool>;

    async fn touch(&self, id: ApiKeyId, last_used_at: DateTime<Utc>) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct PgApiKeyRepository {
    pool: PgPool,
}

impl PgApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiKeyRepository for PgApiKeyRepository {
    async fn insert(&self, key: &ApiKey) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO api_keys \
             (id, realm_id, name, key_hash, key_prefix, created_at, expires_at, last_used_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(key.id)
        .bind(key.realm_id)
        .bind(&key.name)
        .bind(&key.key_hash)
        .bind(&key.key_prefix)
        .bind(key.created_at)
        .bind(key.expires_at)
        .bind(key.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "api key hash"))?;
        Ok(())
    }

    async fn find_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKey>> {
        let query = format!("SELECT {} FROM api_keys WHERE key_hash = $1", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, ApiKey>(&query)
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_for_realm(
        &self,
        realm_id: RealmId,
        id: ApiKeyId,
    ) -> StoreResult<Option<ApiKey>> {
        let query = format!(
            "SELECT {} FROM api_keys WHERE id = $1 AND realm_id = $2",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, ApiKey>(&query)
            .bind(id)
            .bind(realm_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_for_realm(&self, realm_id: RealmId) -> StoreResult<Vec<ApiKey>> {
        let query = format!(
            "SELECT {} FROM api_keys WHERE realm_id = $1 ORDER BY created_at DESC, id DESC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ApiKey>(&query)
            .bind(realm_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn delete_for_realm(&self, realm_id: RealmId, id: ApiKeyId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1 AND realm_id = $2")
            .bind(id)
            .bind(realm_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch(&self, id: ApiKeyId, last_used_at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = $1 WHERE id = $2")
            .bind(last_used_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
