//! Device request repository.
//!
//! Status transitions are conditional updates guarded by the expected current
//! status, so two concurrent approvals of one code have exactly one winner.
//! Terminal rows are handed out through `take`, which deletes and returns in a
//! single statement to guarantee single delivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};

use super::{map_insert_error, StoreResult};
use crate::models::{device_request::DeviceRequest, mesh::JoinCredential};
use crate::types::RealmId;

const SELECT_COLUMNS: &str =
    "device_code, user_code, status, realm_id, issued_credential, created_at, expires_at";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceRequestRepository: Send + Sync {
    /// Fails with `Conflict` when the device code or user code is live.
    async fn insert(&self, request: &DeviceRequest) -> StoreResult<()>;

    async fn user_code_exists(&self, user_code: &str) -> StoreResult<bool>;

    async fn find_by_user_code(&self, user_code: &str) -> StoreResult<Option<DeviceRequest>>;

    async fn find_by_device_code(&self, device_code: &str)
        -> StoreResult<Option<DeviceRequest>>;

    /// `pending` → `approved`, only while unexpired at `now`.
    async fn approve(
        &self,
        user_code: &str,
        realm_id: RealmId,
        credential: &JoinCredential,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// `pending` → `denied`, only while unexpired at `now`.
    async fn deny(&self, user_code: &str, realm_id: RealmId, now: DateTime<Utc>)
        -> StoreResult<bool>;

    /// Deletes the row and returns it; `None` if another caller took it first.
    async fn take(&self, device_code: &str) -> StoreResult<Option<DeviceRequest>>;

    async fn list_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<String>>;

    async fn delete(&self, device_code: &str) -> StoreResult<bool>;
}

#[derive(Clone)]
pub struct PgDeviceRequestRepository {
    pool: PgPool,
}

impl PgDeviceRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceRequestRepository for PgDeviceRequestRepository {
    async fn insert(&self, request: &DeviceRequest) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO device_requests \
             (device_code, user_code, status, realm_id, issued_credential, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&request.device_code)
        .bind(&request.user_code)
        .bind(request.status)
        .bind(request.realm_id)
        .bind(&request.issued_credential)
        .bind(request.created_at)
        .bind(request.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "device or user code"))?;
        Ok(())
    }

    async fn user_code_exists(&self, user_code: &str) -> StoreResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM device_requests WHERE user_code = $1)")
                .bind(user_code)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn find_by_user_code(&self, user_code: &str) -> StoreResult<Option<DeviceRequest>> {
        let query = format!(
            "SELECT {} FROM device_requests WHERE user_code = $1",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, DeviceRequest>(&query)
            .bind(user_code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_device_code(
        &self,
        device_code: &str,
    ) -> StoreResult<Option<DeviceRequest>> {
        let query = format!(
            "SELECT {} FROM device_requests WHERE device_code = $1",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, DeviceRequest>(&query)
            .bind(device_code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn approve(
        &self,
        user_code: &str,
        realm_id: RealmId,
        credential: &JoinCredential,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE device_requests
            SET status = 'approved', realm_id = $2, issued_credential = $3
            WHERE user_code = $1 AND status = 'pending' AND expires_at > $4
            "#,
        )
        .bind(user_code)
        .bind(realm_id)
        .bind(Json(credential))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn deny(
        &self,
        user_code: &str,
        realm_id: RealmId,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE device_requests
            SET status = 'denied', realm_id = $2
            WHERE user_code = $1 AND status = 'pending' AND expires_at > $3
            "#,
        )
        .bind(user_code)
        .bind(realm_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn take(&self, device_code: &str) -> StoreResult<Option<DeviceRequest>> {
        let query = format!(
            "DELETE FROM device_requests WHERE device_code = $1 RETURNING {}",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, DeviceRequest>(&query)
            .bind(device_code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let codes = sqlx::query_scalar::<_, String>(
            "SELECT device_code FROM device_requests WHERE expires_at <= $1 ORDER BY expires_at",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(codes)
    }

    async fn delete(&self, device_code: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM device_requests WHERE device_code = $1")
            .bind(device_code)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
