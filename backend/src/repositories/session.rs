use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{map_insert_error, StoreResult};
use crate::models::session::Session;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: &Session) -> StoreResult<()>;

    async fn find(&self, id: &str) -> StoreResult<Option<Session>>;

    async fn touch(&self, id: &str, last_used_at: DateTime<Utc>) -> StoreResult<()>;

    async fn delete(&self, id: &str) -> StoreResult<()>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn insert(&self, session: &Session) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, realm_id, created_at, expires_at, last_used_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(session.realm_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "session id"))?;
        Ok(())
    }

    async fn find(&self, id: &str) -> StoreResult<Option<Session>> {
        let row = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, realm_id, created_at, expires_at, last_used_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn touch(&self, id: &str, last_used_at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE sessions SET last_used_at = $1 WHERE id = $2")
            .bind(last_used_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
