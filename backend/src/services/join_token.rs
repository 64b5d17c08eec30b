//! Join-token issuance and exchange.
//!
//! A join token is a capability valid until `exp`, not a one-time ticket:
//! every exchange before then mints a new mesh credential. Revocation is by
//! deleting the realm, which exchange re-checks.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::error::CoreError;
use crate::models::join_token::JoinTokenInspection;
use crate::models::mesh::JoinCredential;
use crate::models::realm::Realm;
use crate::repositories::RealmRepository;
use crate::services::mesh::MeshGateway;
use crate::utils::jwt::{parse_unverified, JoinTokenClaims, JoinTokenCodec};

/// Shortest lifetime a caller may request.
pub const MIN_JOIN_TOKEN_TTL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct JoinTokenSettings {
    pub coordinator_url: String,
    pub mesh_url: String,
    pub default_ttl: Duration,
    pub max_ttl: Duration,
    pub credential_ttl: Duration,
}

pub struct JoinTokenService {
    codec: JoinTokenCodec,
    realms: Arc<dyn RealmRepository>,
    mesh: Arc<dyn MeshGateway>,
    settings: JoinTokenSettings,
}

impl JoinTokenService {
    pub fn new(
        codec: JoinTokenCodec,
        realms: Arc<dyn RealmRepository>,
        mesh: Arc<dyn MeshGateway>,
        settings: JoinTokenSettings,
    ) -> Self {
        Self {
            codec,
            realms,
            mesh,
            settings,
        }
    }

    pub fn coordinator_url(&self) -> &str {
        &self.settings.coordinator_url
    }

    /// Signs a token for `realm`. A requested TTL above the configured
    /// maximum is capped.
    pub fn generate(
        &self,
        realm: &Realm,
        ttl_secs: Option<u64>,
    ) -> Result<(String, JoinTokenClaims), CoreError> {
        let ttl = match ttl_secs {
            Some(secs) if secs < MIN_JOIN_TOKEN_TTL_SECS => {
                return Err(CoreError::Validation(format!(
                    "ttl must be at least {} seconds",
                    MIN_JOIN_TOKEN_TTL_SECS
                )));
            }
            Some(secs) => i64::try_from(secs)
                .ok()
                .and_then(Duration::try_seconds)
                .map_or(self.settings.max_ttl, |ttl| ttl.min(self.settings.max_ttl)),
            None => self.settings.default_ttl,
        };

        let now = Utc::now();
        let claims = JoinTokenClaims {
            realm_id: realm.id,
            mesh_namespace: realm.mesh_namespace.clone(),
            coordinator_url: self.settings.coordinator_url.clone(),
            mesh_url: self.settings.mesh_url.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        let token = self.codec.sign(&claims)?;
        tracing::info!(realm_id = %realm.id, exp = claims.exp, "Issued join token");
        Ok((token, claims))
    }

    /// Verifies the token, re-resolves its realm and mints a fresh credential.
    pub async fn exchange(&self, token: &str) -> Result<JoinCredential, CoreError> {
        let claims = self.codec.verify(token, Utc::now())?;

        let realm = self
            .realms
            .find_by_id(claims.realm_id)
            .await?
            .ok_or_else(|| {
                tracing::info!(realm_id = %claims.realm_id, "Join token for deleted realm");
                CoreError::InvalidOrExpiredToken
            })?;
        if realm.mesh_namespace != claims.mesh_namespace {
            tracing::warn!(realm_id = %realm.id, "Join token namespace does not match realm");
            return Err(CoreError::InvalidOrExpiredToken);
        }

        let credential = self
            .mesh
            .create_join_credential(&realm.mesh_namespace, self.settings.credential_ttl, false)
            .await?;
        if !credential.is_well_formed() {
            return Err(CoreError::MeshGatewayUnavailable(
                "control plane returned an unusable credential".to_string(),
            ));
        }
        tracing::info!(realm_id = %realm.id, "Exchanged join token");
        Ok(credential)
    }

    /// Signature-unverified view of a token, for display before submission.
    pub fn inspect(&self, token: &str) -> Result<JoinTokenInspection, CoreError> {
        let claims = parse_unverified(token)?;
        Ok(JoinTokenInspection {
            expires_at: claims.expires_at(),
            expired: claims.is_expired_at(Utc::now()),
            claims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MockRealmRepository;
    use crate::services::mesh::MockMeshGateway;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn settings() -> JoinTokenSettings {
        JoinTokenSettings {
            coordinator_url: "https://coord.example.com".into(),
            mesh_url: "https://mesh.example.com".into(),
            default_ttl: Duration::hours(24),
            max_ttl: Duration::hours(720),
            credential_ttl: Duration::minutes(60),
        }
    }

    fn service(realms: MockRealmRepository, mesh: MockMeshGateway) -> JoinTokenService {
        JoinTokenService::new(
            JoinTokenCodec::new(SECRET).expect("codec"),
            Arc::new(realms),
            Arc::new(mesh),
            settings(),
        )
    }

    fn minting_mesh() -> MockMeshGateway {
        let mut mesh = MockMeshGateway::new();
        mesh.expect_create_join_credential()
            .returning(|ns, ttl, reusable| {
                Ok(JoinCredential {
                    auth_key: format!("key-{}", ns),
                    namespace: ns.to_string(),
                    login_server: "https://mesh.example.com".into(),
                    expires_at: Utc::now() + ttl,
                    reusable,
                })
            });
        mesh
    }

    #[test]
    fn generated_claims_carry_realm_and_urls() {
        let realm = Realm::new("u", "U", Utc::now());
        let svc = service(MockRealmRepository::new(), MockMeshGateway::new());
        let (token, claims) = svc.generate(&realm, None).expect("generate");
        assert_eq!(claims.realm_id, realm.id);
        assert_eq!(claims.mesh_namespace, realm.mesh_namespace);
        assert_eq!(claims.coordinator_url, "https://coord.example.com");
        assert_eq!(claims.exp - claims.iat, 24 * 3600);

        let inspected = svc.inspect(&token).expect("inspect");
        assert_eq!(inspected.claims, claims);
        assert!(!inspected.expired);
    }

    #[test]
    fn requested_ttl_is_capped() {
        let realm = Realm::new("u", "U", Utc::now());
        let svc = service(MockRealmRepository::new(), MockMeshGateway::new());
        let (_, claims) = svc.generate(&realm, Some(u64::MAX)).expect("generate");
        assert_eq!(claims.exp - claims.iat, 720 * 3600);
    }

    #[test]
    fn tiny_ttl_is_rejected() {
        let realm = Realm::new("u", "U", Utc::now());
        let svc = service(MockRealmRepository::new(), MockMeshGateway::new());
        assert!(matches!(
            svc.generate(&realm, Some(5)),
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn exchange_is_repeatable_until_expiry() {
        let realm = Realm::new("u", "U", Utc::now());
        let found = realm.clone();
        let mut realms = MockRealmRepository::new();
        realms
            .expect_find_by_id()
            .returning(move |_| Ok(Some(found.clone())));

        let svc = service(realms, minting_mesh());
        let (token, _) = svc.generate(&realm, Some(3600)).expect("generate");
        for _ in 0..3 {
            let credential = svc.exchange(&token).await.expect("exchange");
            assert!(credential.is_well_formed());
            assert_eq!(credential.namespace, realm.mesh_namespace);
        }
    }

    #[tokio::test]
    async fn exchange_fails_closed_for_deleted_realm() {
        let realm = Realm::new("u", "U", Utc::now());
        let mut realms = MockRealmRepository::new();
        realms.expect_find_by_id().returning(|_| Ok(None));
        let mut mesh = MockMeshGateway::new();
        mesh.expect_create_join_credential().never();

        let svc = service(realms, mesh);
        let (token, _) = svc.generate(&realm, None).expect("generate");
        assert!(matches!(
            svc.exchange(&token).await,
            Err(CoreError::InvalidOrExpiredToken)
        ));
    }

    #[tokio::test]
    async fn expired_token_is_rejected_before_lookup() {
        let realm = Realm::new("u", "U", Utc::now());
        let codec = JoinTokenCodec::new(SECRET).expect("codec");
        let now = Utc::now();
        let token = codec
            .sign(&JoinTokenClaims {
                realm_id: realm.id,
                mesh_namespace: realm.mesh_namespace.clone(),
                coordinator_url: "https://coord.example.com".into(),
                mesh_url: "https://mesh.example.com".into(),
                iat: (now - Duration::hours(2)).timestamp(),
                exp: (now - Duration::hours(1)).timestamp(),
            })
            .expect("sign");

        let mut realms = MockRealmRepository::new();
        realms.expect_find_by_id().never();
        let svc = service(realms, MockMeshGateway::new());
        assert!(matches!(
            svc.exchange(&token).await,
            Err(CoreError::InvalidOrExpiredToken)
        ));
        assert!(svc.inspect(&token).expect("inspect").expired);
    }
}
