//! Session and API-key authentication.
//!
//! Bearer discrimination is by prefix: a credential starting with
//! [`crate::utils::secrets::API_KEY_PREFIX`] is an API key, anything else is a session id. Session
//! ids are generated so they never carry that prefix.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::error::CoreError;
use crate::models::{
    api_key::{ApiKey, CreateApiKeyRequest},
    realm::Realm,
    session::Session,
};
use crate::repositories::{ApiKeyRepository, RealmRepository, SessionRepository};
use crate::types::{ApiKeyId, RealmId};
use crate::utils::secrets::{generate_api_key, generate_session_id, hash_secret, is_api_key};

/// How the caller proved who they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Session { session_id: String, user_id: String },
    ApiKey { key_id: ApiKeyId },
}

/// Result of a successful authentication; always exactly one realm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub realm: Realm,
    pub method: AuthMethod,
}

impl AuthContext {
    pub fn realm_id(&self) -> RealmId {
        self.realm.id
    }

    pub fn session_id(&self) -> Option<&str> {
        match &self.method {
            AuthMethod::Session { session_id, .. } => Some(session_id),
            AuthMethod::ApiKey { .. } => None,
        }
    }
}

pub struct AuthService {
    sessions: Arc<dyn SessionRepository>,
    api_keys: Arc<dyn ApiKeyRepository>,
    realms: Arc<dyn RealmRepository>,
}

impl AuthService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        api_keys: Arc<dyn ApiKeyRepository>,
        realms: Arc<dyn RealmRepository>,
    ) -> Self {
        Self {
            sessions,
            api_keys,
            realms,
        }
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        realm_id: RealmId,
        ttl: Duration,
    ) -> Result<Session, CoreError> {
        let now = Utc::now();
        let session = Session {
            id: generate_session_id(),
            user_id: user_id.to_string(),
            realm_id,
            created_at: now,
            expires_at: now + ttl,
            last_used_at: None,
        };
        self.sessions.insert(&session).await?;
        tracing::debug!(user_id = %user_id, realm_id = %realm_id, "Created session");
        Ok(session)
    }

    /// Accepts either a session id or an API key.
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<AuthContext, CoreError> {
        let credential = credential.ok_or(CoreError::NoCredentials)?;
        if is_api_key(credential) {
            self.resolve_api_key(credential).await
        } else {
            self.resolve_session(credential).await
        }
    }

    /// For endpoints that mint further credentials; API keys are refused.
    pub async fn session_only(&self, credential: Option<&str>) -> Result<AuthContext, CoreError> {
        let credential = credential.ok_or(CoreError::NoCredentials)?;
        if is_api_key(credential) {
            return Err(CoreError::InvalidSession);
        }
        self.resolve_session(credential).await
    }

    /// For automation endpoints; sessions are refused.
    pub async fn api_key_only(&self, credential: Option<&str>) -> Result<AuthContext, CoreError> {
        let credential = credential.ok_or(CoreError::NoCredentials)?;
        if !is_api_key(credential) {
            return Err(CoreError::InvalidApiKey);
        }
        self.resolve_api_key(credential).await
    }

    async fn resolve_session(&self, session_id: &str) -> Result<AuthContext, CoreError> {
        let now = Utc::now();
        let session = self
            .sessions
            .find(session_id)
            .await?
            .ok_or(CoreError::InvalidSession)?;
        if session.is_expired_at(now) {
            if let Err(err) = self.sessions.delete(session_id).await {
                tracing::warn!(error = %err, "Failed to delete expired session");
            }
            return Err(CoreError::InvalidSession);
        }

        let realm = self
            .realms
            .find_by_id(session.realm_id)
            .await?
            .ok_or(CoreError::NoRealmForOwner)?;

        let sessions = Arc::clone(&self.sessions);
        let id = session.id.clone();
        tokio::spawn(async move {
            if let Err(err) = sessions.touch(&id, now).await {
                tracing::warn!(error = %err, "Failed to record session use");
            }
        });

        Ok(AuthContext {
            realm,
            method: AuthMethod::Session {
                session_id: session.id,
                user_id: session.user_id,
            },
        })
    }

    async fn resolve_api_key(&self, raw: &str) -> Result<AuthContext, CoreError> {
        let now = Utc::now();
        let key = self
            .api_keys
            .find_by_hash(&hash_secret(raw))
            .await?
            .ok_or(CoreError::InvalidApiKey)?;
        if key.is_expired_at(now) {
            return Err(CoreError::ApiKeyExpired);
        }

        let realm = self
            .realms
            .find_by_id(key.realm_id)
            .await?
            .ok_or(CoreError::RealmNotFound)?;

        let api_keys = Arc::clone(&self.api_keys);
        let key_id = key.id;
        tokio::spawn(async move {
            if let Err(err) = api_keys.touch(key_id, now).await {
                tracing::warn!(api_key_id = %key_id, error = %err, "Failed to record API key use");
            }
        });

        Ok(AuthContext {
            realm,
            method: AuthMethod::ApiKey { key_id },
        })
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), CoreError> {
        self.sessions.delete(session_id).await?;
        Ok(())
    }

    /// Returns the stored key and the raw key. The raw key is not
    /// recoverable afterwards.
    pub async fn create_api_key(
        &self,
        realm_id: RealmId,
        request: &CreateApiKeyRequest,
    ) -> Result<(ApiKey, String), CoreError> {
        let now = Utc::now();
        if request.expires_at.is_some_and(|at| at <= now) {
            return Err(CoreError::Validation(
                "expires_at must be in the future".to_string(),
            ));
        }

        let (raw, prefix) = generate_api_key();
        let key = ApiKey {
            id: ApiKeyId::new(),
            realm_id,
            name: request.name.trim().to_string(),
            key_hash: hash_secret(&raw),
            key_prefix: prefix,
            created_at: now,
            expires_at: request.expires_at,
            last_used_at: None,
        };
        self.api_keys.insert(&key).await?;
        tracing::info!(api_key_id = %key.id, realm_id = %realm_id, "Created API key");
        Ok((key, raw))
    }

    pub async fn list_api_keys(&self, realm_id: RealmId) -> Result<Vec<ApiKey>, CoreError> {
        Ok(self.api_keys.list_for_realm(realm_id).await?)
    }

    pub async fn get_api_key(&self, realm_id: RealmId, id: ApiKeyId) -> Result<ApiKey, CoreError> {
        self.api_keys
            .find_for_realm(realm_id, id)
            .await?
            .ok_or(CoreError::ApiKeyNotFound)
    }

    pub async fn delete_api_key(&self, realm_id: RealmId, id: ApiKeyId) -> Result<(), CoreError> {
        if !self.api_keys.delete_for_realm(realm_id, id).await? {
            return Err(CoreError::ApiKeyNotFound);
        }
        tracing::info!(api_key_id = %id, realm_id = %realm_id, "Deleted API key");
        Ok(())
    }
}
