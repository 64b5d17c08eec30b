use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::types::RealmId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
/// Browser or machine login session.
pub struct Session {
    /// Opaque 256-bit identifier; doubles as the bearer secret.
    pub id: String,
    /// External identity that logged in.
    pub user_id: String,
    /// Realm the identity resolved to at login.
    pub realm_id: RealmId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Machine login: an identity-provider ID token traded for a session.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct IdTokenLoginRequest {
    #[validate(length(min = 1))]
    pub id_token: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionTokenResponse {
    /// Bearer credential for subsequent calls.
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub realm_id: RealmId,
}

impl From<Session> for SessionTokenResponse {
    fn from(session: Session) -> Self {
        Self {
            session_token: session.id,
            expires_at: session.expires_at,
            realm_id: session.realm_id,
        }
    }
}
