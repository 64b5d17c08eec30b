//! Realm repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{map_insert_error, StoreResult};
use crate::models::realm::Realm;
use crate::types::RealmId;

const SELECT_COLUMNS: &str =
    "id, owner_id, mesh_namespace, display_name, created_at, updated_at, deleted_at";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RealmRepository: Send + Sync {
    /// Inserts a realm. Fails with `Conflict` if the owner already has an
    /// active realm or the namespace is taken.
    async fn insert(&self, realm: &Realm) -> StoreResult<()>;

    /// Active (not deleted) realm by id.
    async fn find_by_id(&self, id: RealmId) -> StoreResult<Option<Realm>>;

    /// Active realm owned by `owner_id`; earliest created wins if several exist.
    async fn find_by_owner(&self, owner_id: &str) -> StoreResult<Option<Realm>>;

    /// Marks the realm deleted. Returns false if it was unknown or already deleted.
    async fn soft_delete(&self, id: RealmId, now: DateTime<Utc>) -> StoreResult<bool>;
}

#[derive(Clone)]
pub struct PgRealmRepository {
    pool: PgPool,
}

impl PgRealmRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RealmRepository for PgRealmRepository {
    async fn insert(&self, realm: &Realm) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO realms \
             (id, owner_id, mesh_namespace, display_name, created_at, updated_at, deleted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(realm.id)
        .bind(&realm.owner_id)
        .bind(&realm.mesh_namespace)
        .bind(&realm.display_name)
        .bind(realm.created_at)
        .bind(realm.updated_at)
        .bind(realm.deleted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "realm owner or namespace"))?;
        Ok(())
    }

    async fn find_by_id(&self, id: RealmId) -> StoreResult<Option<Realm>> {
        let query = format!(
            "SELECT {} FROM realms WHERE id = $1 AND deleted_at IS NULL",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, Realm>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_owner(&self, owner_id: &str) -> StoreResult<Option<Realm>> {
        let query = format!(
            "SELECT {} FROM realms WHERE owner_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at ASC, id ASC LIMIT 1",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, Realm>(&query)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn soft_delete(&self, id: RealmId, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE realms SET deleted_at = $2, updated_at = $2 \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
