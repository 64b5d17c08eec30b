use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::mesh::JoinCredential;
use crate::utils::jwt::JoinTokenClaims;

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CreateJoinTokenRequest {
    /// Lifetime in seconds; defaults to the configured join-token TTL.
    #[validate(range(min = 60))]
    pub ttl: Option<u64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JoinTokenResponse {
    /// Bearer capability: every exchange before `expires_at` mints a new
    /// join credential. It is not a one-time ticket.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct JoinTokenPayload {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WorkerJoinResponse {
    #[serde(flatten)]
    pub credential: JoinCredential,
    pub coordinator_url: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JoinTokenInspection {
    /// Claims read without signature verification. Informational only.
    pub claims: JoinTokenClaims,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
}
