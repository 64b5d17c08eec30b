//! Typed `service_principal_id → realm_id` lookup table.

use async_trait::async_trait;
use sqlx::PgPool;

use super::StoreResult;
use crate::models::service_principal::ServicePrincipal;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServicePrincipalRepository: Send + Sync {
    async fn find(&self, service_principal_id: &str) -> StoreResult<Option<ServicePrincipal>>;

    /// Creates or rebinds the principal.
    async fn upsert(&self, principal: &ServicePrincipal) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct PgServicePrincipalRepository {
    pool: PgPool,
}

impl PgServicePrincipalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServicePrincipalRepository for PgServicePrincipalRepository {
    async fn find(&self, service_principal_id: &str) -> StoreResult<Option<ServicePrincipal>> {
        let row = sqlx::query_as::<_, ServicePrincipal>(
            "SELECT service_principal_id, realm_id, created_at FROM service_principals \
             WHERE service_principal_id = $1",
        )
        .bind(service_principal_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert(&self, principal: &ServicePrincipal) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO service_principals (service_principal_id, realm_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (service_principal_id) DO UPDATE SET realm_id = EXCLUDED.realm_id
            "#,
        )
        .bind(&principal.service_principal_id)
        .bind(principal.realm_id)
        .bind(principal.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
