//! Browser and token logins through the identity provider.
//!
//! The browser flow stores an [`AuthState`] when it starts and consumes it
//! exactly once on callback; an unknown, reused or stale state is refused.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::error::CoreError;
use crate::models::{auth_state::AuthState, session::Session};
use crate::repositories::AuthStateRepository;
use crate::services::{
    auth::AuthService,
    identity::{IdentityGateway, OIDC_PROVIDER},
    provisioning::{RealmService, ResolvedRealm},
};
use crate::utils::secrets::generate_state_token;

const DEFAULT_RETURN_PATH: &str = "/";

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session: Session,
    pub resolved: ResolvedRealm,
    /// Local path to send the browser back to.
    pub return_to: String,
}

pub struct LoginService {
    identity: Arc<dyn IdentityGateway>,
    auth_states: Arc<dyn AuthStateRepository>,
    realms: Arc<RealmService>,
    auth: Arc<AuthService>,
    state_ttl: Duration,
    session_ttl: Duration,
}

/// Only same-origin absolute paths are accepted as return targets.
pub fn sanitize_return_path(candidate: Option<&str>) -> String {
    match candidate {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => DEFAULT_RETURN_PATH.to_string(),
    }
}

impl LoginService {
    pub fn new(
        identity: Arc<dyn IdentityGateway>,
        auth_states: Arc<dyn AuthStateRepository>,
        realms: Arc<RealmService>,
        auth: Arc<AuthService>,
        state_ttl: Duration,
        session_ttl: Duration,
    ) -> Self {
        Self {
            identity,
            auth_states,
            realms,
            auth,
            state_ttl,
            session_ttl,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Records a fresh state and returns the provider's login URL.
    pub async fn begin(&self, return_to: Option<&str>) -> Result<String, CoreError> {
        let state = generate_state_token();
        let nonce = generate_state_token();
        let url = self.identity.authorization_url(&state, &nonce).await?;

        let now = Utc::now();
        self.auth_states
            .insert(&AuthState {
                state,
                redirect_uri: sanitize_return_path(return_to),
                provider: OIDC_PROVIDER.to_string(),
                nonce,
                created_at: now,
                expires_at: now + self.state_ttl,
            })
            .await?;
        Ok(url)
    }

    /// Completes the authorization-code flow.
    pub async fn complete(&self, code: &str, state: &str) -> Result<LoginOutcome, CoreError> {
        let auth_state = self
            .auth_states
            .take(state)
            .await?
            .ok_or(CoreError::InvalidStateOrCsrf)?;
        if auth_state.is_expired_at(Utc::now()) {
            return Err(CoreError::InvalidStateOrCsrf);
        }

        let claims = self.identity.exchange_code(code, &auth_state.nonce).await?;
        let resolved = self.realms.resolve_realm_from_identity(&claims).await?;
        let session = self
            .auth
            .create_session(&claims.subject, resolved.realm.id, self.session_ttl)
            .await?;
        tracing::info!(
            user_id = %claims.subject,
            realm_id = %resolved.realm.id,
            service_principal = resolved.is_service_principal,
            "Login completed"
        );
        Ok(LoginOutcome {
            session,
            resolved,
            return_to: auth_state.redirect_uri,
        })
    }

    /// Exchanges a provider ID token for a session; used by CLIs and machines.
    pub async fn with_id_token(&self, id_token: &str) -> Result<LoginOutcome, CoreError> {
        let claims = self.identity.validate_id_token(id_token, None).await?;
        let resolved = self.realms.resolve_realm_from_identity(&claims).await?;
        let session = self
            .auth
            .create_session(&claims.subject, resolved.realm.id, self.session_ttl)
            .await?;
        Ok(LoginOutcome {
            session,
            resolved,
            return_to: DEFAULT_RETURN_PATH.to_string(),
        })
    }
}
