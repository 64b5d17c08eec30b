//! Join-token codec.
//!
//! A join token is an HS256 JWT binding one realm. It is a bearer capability:
//! every exchange before `exp` mints a fresh mesh credential, so it must be
//! handed out as "valid until exp", never as a one-time ticket.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{config::MIN_JOIN_TOKEN_SECRET_LEN, error::CoreError, types::RealmId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JoinTokenClaims {
    #[schema(value_type = String)]
    pub realm_id: RealmId,
    pub mesh_namespace: String,
    pub coordinator_url: String,
    pub mesh_url: String,
    pub iat: i64,
    pub exp: i64,
}

impl JoinTokenClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}

#[derive(Clone)]
pub struct JoinTokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for JoinTokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinTokenCodec").finish_non_exhaustive()
    }
}

impl JoinTokenCodec {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        if secret.len() < MIN_JOIN_TOKEN_SECRET_LEN {
            anyhow::bail!(
                "join token secret must be at least {} bytes",
                MIN_JOIN_TOKEN_SECRET_LEN
            );
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    pub fn sign(&self, claims: &JoinTokenClaims) -> anyhow::Result<String> {
        let token = encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?;
        Ok(token)
    }

    /// Checks the signature, then expiry against `now`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<JoinTokenClaims, CoreError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against the caller's clock.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        let data = decode::<JoinTokenClaims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!(error = %e, "Join token failed verification");
            CoreError::InvalidOrExpiredToken
        })?;
        if data.claims.is_expired_at(now) {
            return Err(CoreError::InvalidOrExpiredToken);
        }
        Ok(data.claims)
    }
}

/// Decodes the claims without checking the signature.
///
/// For display only (target coordinator, expiry); never authorize with it.
pub fn parse_unverified(token: &str) -> Result<JoinTokenClaims, CoreError> {
    let mut parts = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(CoreError::InvalidOrExpiredToken);
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| CoreError::InvalidOrExpiredToken)?;
    serde_json::from_slice(&bytes).map_err(|_| CoreError::InvalidOrExpiredToken)
}
