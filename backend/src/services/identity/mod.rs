//! Identity-provider contract.

pub mod oidc;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::identity::IdentityClaims;

pub use oidc::OidcIdentityGateway;

/// Name recorded on auth states created for the configured provider.
pub const OIDC_PROVIDER: &str = "oidc";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    /// URL of the provider's login page for an authorization-code flow.
    async fn authorization_url(&self, state: &str, nonce: &str) -> Result<String, CoreError>;

    /// Redeems an authorization code and returns the verified claims.
    async fn exchange_code(&self, code: &str, nonce: &str) -> Result<IdentityClaims, CoreError>;

    /// Verifies a provider-issued ID token (signature, audience, issuer, expiry).
    async fn validate_id_token<'a>(
        &self,
        id_token: &str,
        nonce: Option<&'a str>,
    ) -> Result<IdentityClaims, CoreError>;
}

/// Stand-in used when no identity provider is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredIdentityGateway;

impl UnconfiguredIdentityGateway {
    fn error() -> CoreError {
        CoreError::IdentityGatewayUnavailable("no identity provider configured".to_string())
    }
}

#[async_trait]
impl IdentityGateway for UnconfiguredIdentityGateway {
    async fn authorization_url(&self, _state: &str, _nonce: &str) -> Result<String, CoreError> {
        Err(Self::error())
    }

    async fn exchange_code(&self, _code: &str, _nonce: &str) -> Result<IdentityClaims, CoreError> {
        Err(Self::error())
    }

    async fn validate_id_token<'a>(
        &self,
        _id_token: &str,
        _nonce: Option<&'a str>,
    ) -> Result<IdentityClaims, CoreError> {
        Err(Self::error())
    }
}
