//! OpenID Connect identity gateway.
//!
//! Endpoints come from the issuer's discovery document; ID tokens are
//! verified against the issuer's JWKS. Both documents are cached, and the
//! key set is refetched once when a token names an unknown key id.

use std::collections::HashMap;

use async_trait::async_trait;
use jsonwebtoken::{
    decode, decode_header,
    jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse},
    Algorithm, DecodingKey, Validation,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use super::IdentityGateway;
use crate::config::OidcConfig;
use crate::error::CoreError;
use crate::models::identity::{IdentityClaims, PrincipalKind};

const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

#[derive(Debug, Clone, Deserialize)]
struct Discovery {
    issuer: String,
    authorization_endpoint: String,
    token_endpoint: String,
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    preferred_username: Option<String>,
    nonce: Option<String>,
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

pub struct OidcIdentityGateway {
    config: OidcConfig,
    http: Client,
    discovery: RwLock<Option<Discovery>>,
    jwks: RwLock<Option<JwkSet>>,
}

impl std::fmt::Debug for OidcIdentityGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcIdentityGateway")
            .field("issuer", &self.config.issuer)
            .field("client_id", &self.config.client_id)
            .finish_non_exhaustive()
    }
}

fn key_algorithm_matches(declared: &KeyAlgorithm, alg: Algorithm) -> bool {
    matches!(
        (declared, alg),
        (KeyAlgorithm::RS256, Algorithm::RS256)
            | (KeyAlgorithm::RS384, Algorithm::RS384)
            | (KeyAlgorithm::RS512, Algorithm::RS512)
            | (KeyAlgorithm::PS256, Algorithm::PS256)
            | (KeyAlgorithm::PS384, Algorithm::PS384)
            | (KeyAlgorithm::PS512, Algorithm::PS512)
            | (KeyAlgorithm::ES256, Algorithm::ES256)
            | (KeyAlgorithm::ES384, Algorithm::ES384)
            | (KeyAlgorithm::EdDSA, Algorithm::EdDSA)
    )
}

/// Whether `jwk` can verify a signature made with `alg`. A declared `alg`
/// must match exactly; otherwise the key type decides.
fn key_fits(jwk: &Jwk, alg: Algorithm) -> bool {
    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
        return false;
    }
    if let Some(declared) = jwk.common.key_algorithm.as_ref() {
        return key_algorithm_matches(declared, alg);
    }
    match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => matches!(
            alg,
            Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512
        ),
        AlgorithmParameters::EllipticCurve(_) => {
            matches!(alg, Algorithm::ES256 | Algorithm::ES384)
        }
        AlgorithmParameters::OctetKeyPair(_) => alg == Algorithm::EdDSA,
        _ => false,
    }
}

/// Key named by `kid`, or the first key usable for `alg` when the token
/// carries no key id.
fn select_key(set: &JwkSet, kid: Option<&str>, alg: Algorithm) -> Option<Jwk> {
    match kid {
        Some(kid) => set.find(kid).filter(|jwk| key_fits(jwk, alg)).cloned(),
        None => set.keys.iter().find(|jwk| key_fits(jwk, alg)).cloned(),
    }
}

fn unavailable(context: &str, err: impl std::fmt::Display) -> CoreError {
    CoreError::IdentityGatewayUnavailable(format!("{}: {}", context, err))
}

impl OidcIdentityGateway {
    pub fn new(config: OidcConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            http,
            discovery: RwLock::new(None),
            jwks: RwLock::new(None),
        })
    }

    async fn discover(&self) -> Result<Discovery, CoreError> {
        if let Some(cached) = self.discovery.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let url = format!("{}/.well-known/openid-configuration", self.config.issuer);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable("discovery", e))?;
        if !resp.status().is_success() {
            return Err(unavailable("discovery", resp.status()));
        }
        let discovery: Discovery = resp.json().await.map_err(|e| unavailable("discovery", e))?;

        *self.discovery.write().await = Some(discovery.clone());
        Ok(discovery)
    }

    async fn fetch_jwks(&self, jwks_uri: &str) -> Result<JwkSet, CoreError> {
        let resp = self
            .http
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| unavailable("jwks", e))?;
        if !resp.status().is_success() {
            return Err(unavailable("jwks", resp.status()));
        }
        let jwks: JwkSet = resp.json().await.map_err(|e| unavailable("jwks", e))?;
        *self.jwks.write().await = Some(jwks.clone());
        Ok(jwks)
    }

    async fn decoding_key(
        &self,
        kid: Option<&str>,
        alg: Algorithm,
        jwks_uri: &str,
    ) -> Result<DecodingKey, CoreError> {
        let cached = self.jwks.read().await.clone();
        let jwks = match cached {
            Some(jwks) => jwks,
            None => self.fetch_jwks(jwks_uri).await?,
        };

        let jwk = match select_key(&jwks, kid, alg) {
            Some(jwk) => jwk,
            // Keys may have rotated since the set was cached.
            None => select_key(&self.fetch_jwks(jwks_uri).await?, kid, alg)
                .ok_or_else(|| CoreError::InvalidIdentityToken("unknown signing key".into()))?,
        };
        DecodingKey::from_jwk(&jwk)
            .map_err(|e| CoreError::InvalidIdentityToken(format!("unusable signing key: {}", e)))
    }

    fn claims_from(&self, raw: IdTokenClaims) -> IdentityClaims {
        let is_service = raw
            .extra
            .get(&self.config.service_principal_claim)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        IdentityClaims {
            subject: raw.sub,
            email: raw.email,
            name: raw.name.or(raw.preferred_username),
            kind: if is_service {
                PrincipalKind::Service
            } else {
                PrincipalKind::Human
            },
        }
    }
}

#[async_trait]
impl IdentityGateway for OidcIdentityGateway {
    async fn authorization_url(&self, state: &str, nonce: &str) -> Result<String, CoreError> {
        let discovery = self.discover().await?;
        let mut url = url::Url::parse(&discovery.authorization_endpoint)
            .map_err(|e| unavailable("authorization endpoint", e))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("scope", "openid email profile")
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str, nonce: &str) -> Result<IdentityClaims, CoreError> {
        let discovery = self.discover().await?;
        let resp = self
            .http
            .post(&discovery.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| unavailable("token exchange", e))?;

        let status = resp.status();
        if status.is_client_error() {
            return Err(CoreError::InvalidIdentityToken(format!(
                "authorization code rejected ({})",
                status
            )));
        }
        if !status.is_success() {
            return Err(unavailable("token exchange", status));
        }

        let tokens: TokenResponse = resp
            .json()
            .await
            .map_err(|e| unavailable("token exchange", e))?;
        let id_token = tokens
            .id_token
            .ok_or_else(|| CoreError::InvalidIdentityToken("no id_token in response".into()))?;
        self.validate_id_token(&id_token, Some(nonce)).await
    }

    async fn validate_id_token<'a>(
        &self,
        id_token: &str,
        nonce: Option<&'a str>,
    ) -> Result<IdentityClaims, CoreError> {
        let header = decode_header(id_token)
            .map_err(|e| CoreError::InvalidIdentityToken(format!("malformed token: {}", e)))?;
        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(CoreError::InvalidIdentityToken(format!(
                "algorithm {:?} not accepted",
                header.alg
            )));
        }

        let discovery = self.discover().await?;
        let key = self
            .decoding_key(header.kid.as_deref(), header.alg, &discovery.jwks_uri)
            .await?;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[self.config.client_id.as_str()]);
        validation.set_issuer(&[discovery.issuer.as_str()]);
        let data = decode::<IdTokenClaims>(id_token, &key, &validation)
            .map_err(|e| CoreError::InvalidIdentityToken(e.to_string()))?;

        if let Some(expected) = nonce {
            if data.claims.nonce.as_deref() != Some(expected) {
                return Err(CoreError::InvalidIdentityToken("nonce mismatch".into()));
            }
        }
        Ok(self.claims_from(data.claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> OidcIdentityGateway {
        OidcIdentityGateway::new(OidcConfig {
            issuer: "https://idp.example.com".into(),
            client_id: "meshrealm".into(),
            client_secret: "secret".into(),
            redirect_url: "http://localhost:8080/auth/callback".into(),
            service_principal_claim: "service_principal".into(),
            timeout_secs: 1,
        })
        .expect("gateway")
    }

    fn raw(extra: serde_json::Value) -> IdTokenClaims {
        let mut base = serde_json::json!({ "sub": "user-1", "preferred_username": "alice" });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(base).expect("claims")
    }

    #[test]
    fn service_principal_claim_marks_machine_identities() {
        let gw = gateway();
        let claims = gw.claims_from(raw(serde_json::json!({ "service_principal": true })));
        assert!(claims.is_service_principal());
        assert_eq!(claims.subject, "user-1");
    }

    #[test]
    fn identities_default_to_human() {
        let gw = gateway();
        let claims = gw.claims_from(raw(serde_json::json!({ "service_principal": "yes" })));
        assert!(!claims.is_service_principal());
        assert_eq!(claims.name.as_deref(), Some("alice"));
    }

    fn mixed_key_set() -> JwkSet {
        serde_json::from_value(serde_json::json!({
            "keys": [
                { "kty": "EC", "crv": "P-256", "kid": "ec-1", "x": "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU", "y": "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0" },
                { "kty": "RSA", "kid": "rsa-enc", "use": "enc", "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbgBHod5pcM9H95GQRV3JDXboIRROSBigeC5yjU1hGzHHyXss8UDprecbAYxknTcQkhslANGRUZmdTOQ5qTRsLAt6BTYuyvVRdhS8exSZEy_c4gs_7svlJJQ4H9_NxsiIoLwAEk7-Q3UXERGYw_75IDrGA84-lA_-Ct4eTlXHBIY2EaV7t7LjJaynVJCpkv4LKjTTAumiGUIuQhrNhZLuF_RJLqHpM2kgWFLU7-VTdL1VbC2tejvcI2BlMkEpk1BzBZI0KQB0GaDWFLN-aEAw3vRw", "e": "AQAB" },
                { "kty": "RSA", "kid": "rsa-sig", "alg": "RS256", "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbgBHod5pcM9H95GQRV3JDXboIRROSBigeC5yjU1hGzHHyXss8UDprecbAYxknTcQkhslANGRUZmdTOQ5qTRsLAt6BTYuyvVRdhS8exSZEy_c4gs_7svlJJQ4H9_NxsiIoLwAEk7-Q3UXERGYw_75IDrGA84-lA_-Ct4eTlXHBIY2EaV7t7LjJaynVJCpkv4LKjTTAumiGUIuQhrNhZLuF_RJLqHpM2kgWFLU7-VTdL1VbC2tejvcI2BlMkEpk1BzBZI0KQB0GaDWFLN-aEAw3vRw", "e": "AQAB" }
            ]
        }))
        .expect("jwks")
    }

    #[test]
    fn key_without_kid_is_chosen_by_algorithm() {
        let set = mixed_key_set();
        let rsa = select_key(&set, None, Algorithm::RS256).expect("rsa key");
        assert_eq!(rsa.common.key_id.as_deref(), Some("rsa-sig"));
        let ec = select_key(&set, None, Algorithm::ES256).expect("ec key");
        assert_eq!(ec.common.key_id.as_deref(), Some("ec-1"));
        assert!(select_key(&set, None, Algorithm::EdDSA).is_none());
    }

    #[test]
    fn named_key_must_fit_the_algorithm() {
        let set = mixed_key_set();
        assert!(select_key(&set, Some("rsa-sig"), Algorithm::RS256).is_some());
        assert!(select_key(&set, Some("rsa-sig"), Algorithm::PS256).is_none());
        assert!(select_key(&set, Some("rsa-enc"), Algorithm::RS256).is_none());
        assert!(select_key(&set, Some("ec-1"), Algorithm::RS256).is_none());
    }

    #[tokio::test]
    async fn symmetric_tokens_are_rejected_before_any_network_call() {
        let gw = gateway();
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::HS256),
            &serde_json::json!({ "sub": "x", "exp": 4_102_444_800u64 }),
            &jsonwebtoken::EncodingKey::from_secret(b"meshrealm"),
        )
        .expect("token");
        let err = gw.validate_id_token(&token, None).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidIdentityToken(_)));
    }
}
