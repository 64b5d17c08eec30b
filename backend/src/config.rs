use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, env, time::Duration};

use crate::utils::cookies::SameSite;

/// Minimum number of bytes accepted for the join-token signing secret.
pub const MIN_JOIN_TOKEN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreBackend {
    Postgres,
    /// Process-local maps. Single instance only.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshBackend {
    Headscale,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    /// Boolean id_token claim that marks a machine identity.
    pub service_principal_claim: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub store_backend: StoreBackend,
    pub database_url: String,
    pub database_max_connections: u32,
    /// Public base URL of this coordinator; embedded in join tokens.
    pub coordinator_url: String,
    pub join_token_secret: String,
    pub join_token_ttl_hours: u64,
    pub join_token_max_ttl_hours: u64,
    pub session_ttl_days: u64,
    pub device_code_ttl_minutes: u64,
    pub device_poll_interval_secs: u64,
    pub device_sweep_interval_secs: u64,
    pub join_credential_ttl_minutes: u64,
    pub mesh_backend: MeshBackend,
    pub mesh_api_url: String,
    pub mesh_api_key: String,
    /// URL workers use to reach the mesh control plane.
    pub mesh_public_url: String,
    pub mesh_timeout_secs: u64,
    pub oidc: Option<OidcConfig>,
    pub auth_state_ttl_minutes: u64,
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
    pub cors_allow_origins: Vec<String>,
    pub request_timeout_secs: u64,
    pub admin_token: Option<String>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_from(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn load_from<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let store_backend = match get("STORE_BACKEND").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => bail!("Invalid STORE_BACKEND value: {}", other),
        };
        let database_url = get("DATABASE_URL").unwrap_or_default();
        if store_backend == StoreBackend::Postgres && database_url.is_empty() {
            bail!("DATABASE_URL is required when STORE_BACKEND=postgres");
        }

        let coordinator_url = get("COORDINATOR_URL")
            .unwrap_or_else(|| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&coordinator_url)
            .map_err(|e| anyhow!("Invalid COORDINATOR_URL value {}: {}", coordinator_url, e))?;

        let join_token_secret =
            get("JOIN_TOKEN_SECRET").ok_or_else(|| anyhow!("JOIN_TOKEN_SECRET is required"))?;
        if join_token_secret.len() < MIN_JOIN_TOKEN_SECRET_LEN {
            bail!(
                "JOIN_TOKEN_SECRET must be at least {} bytes",
                MIN_JOIN_TOKEN_SECRET_LEN
            );
        }

        let mesh_backend = match get("MESH_BACKEND").as_deref() {
            None | Some("headscale") => MeshBackend::Headscale,
            Some("memory") => MeshBackend::Memory,
            Some(other) => bail!("Invalid MESH_BACKEND value: {}", other),
        };
        let mesh_api_url = get("MESH_API_URL")
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string();
        let mesh_api_key = get("MESH_API_KEY").unwrap_or_default();
        if mesh_backend == MeshBackend::Headscale && (mesh_api_url.is_empty() || mesh_api_key.is_empty()) {
            bail!("MESH_API_URL and MESH_API_KEY are required when MESH_BACKEND=headscale");
        }
        let mesh_public_url = get("MESH_PUBLIC_URL").unwrap_or_else(|| mesh_api_url.clone());

        let oidc = match get("OIDC_ISSUER") {
            Some(issuer) => Some(OidcConfig {
                issuer: issuer.trim_end_matches('/').to_string(),
                client_id: get("OIDC_CLIENT_ID")
                    .ok_or_else(|| anyhow!("OIDC_CLIENT_ID is required with OIDC_ISSUER"))?,
                client_secret: get("OIDC_CLIENT_SECRET").unwrap_or_default(),
                redirect_url: get("OIDC_REDIRECT_URL")
                    .unwrap_or_else(|| format!("{}/auth/callback", coordinator_url)),
                service_principal_claim: get("OIDC_SERVICE_PRINCIPAL_CLAIM")
                    .unwrap_or_else(|| "service_principal".to_string()),
                timeout_secs: parse_or(&get, "OIDC_TIMEOUT_SECS", 10)?,
            }),
            None => None,
        };

        let cookie_same_site = match get("COOKIE_SAME_SITE").as_deref() {
            None => SameSite::Lax,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "lax" => SameSite::Lax,
                "strict" => SameSite::Strict,
                "none" => SameSite::None,
                other => bail!("Invalid COOKIE_SAME_SITE value: {}", other),
            },
        };

        let cors_allow_origins = get("CORS_ALLOW_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().trim_end_matches('/').to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec![coordinator_url.clone()]);

        let admin_token = get("ADMIN_TOKEN");
        if let Some(token) = admin_token.as_deref() {
            if token.len() < MIN_JOIN_TOKEN_SECRET_LEN {
                bail!("ADMIN_TOKEN must be at least {} bytes", MIN_JOIN_TOKEN_SECRET_LEN);
            }
        }

        let config = Config {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            store_backend,
            database_url,
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 5)?,
            coordinator_url,
            join_token_secret,
            join_token_ttl_hours: parse_or(&get, "JOIN_TOKEN_TTL_HOURS", 24)?,
            join_token_max_ttl_hours: parse_or(&get, "JOIN_TOKEN_MAX_TTL_HOURS", 720)?,
            session_ttl_days: parse_or(&get, "SESSION_TTL_DAYS", 7)?,
            device_code_ttl_minutes: parse_or(&get, "DEVICE_CODE_TTL_MINUTES", 15)?,
            device_poll_interval_secs: parse_or(&get, "DEVICE_POLL_INTERVAL_SECS", 5)?,
            device_sweep_interval_secs: parse_or(&get, "DEVICE_SWEEP_INTERVAL_SECS", 60)?,
            join_credential_ttl_minutes: parse_or(&get, "JOIN_CREDENTIAL_TTL_MINUTES", 60)?,
            mesh_backend,
            mesh_api_url,
            mesh_api_key,
            mesh_public_url,
            mesh_timeout_secs: parse_or(&get, "MESH_TIMEOUT_SECS", 10)?,
            oidc,
            auth_state_ttl_minutes: parse_or(&get, "AUTH_STATE_TTL_MINUTES", 10)?,
            cookie_secure: parse_or(&get, "COOKIE_SECURE", true)?,
            cookie_same_site,
            cors_allow_origins,
            request_timeout_secs: parse_or(&get, "REQUEST_TIMEOUT_SECS", 30)?,
            admin_token,
        };

        if config.join_token_ttl_hours == 0
            || config.join_token_ttl_hours > config.join_token_max_ttl_hours
        {
            bail!("JOIN_TOKEN_TTL_HOURS must be between 1 and JOIN_TOKEN_MAX_TTL_HOURS");
        }
        if config.device_poll_interval_secs == 0 || config.device_sweep_interval_secs == 0 {
            bail!("Device poll and sweep intervals must be positive");
        }

        Ok(config)
    }

    /// Builds a configuration from literal pairs; later pairs win.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> anyhow::Result<Self> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self::load_from(|key| map.get(key).cloned())
    }

    pub fn mesh_timeout(&self) -> Duration {
        Duration::from_secs(self.mesh_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn device_code_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.device_code_ttl_minutes as i64)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.session_ttl_days as i64)
    }

    pub fn join_credential_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.join_credential_ttl_minutes as i64)
    }

    pub fn auth_state_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.auth_state_ttl_minutes as i64)
    }

    pub fn verification_url(&self) -> String {
        format!("{}/device", self.coordinator_url)
    }
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("Invalid {} value: {}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn memory_pairs() -> Vec<(&'static str, &'static str)> {
        vec![
            ("STORE_BACKEND", "memory"),
            ("MESH_BACKEND", "memory"),
            ("JOIN_TOKEN_SECRET", SECRET),
        ]
    }

    #[test]
    fn defaults_apply_for_memory_backends() {
        let config = Config::from_pairs(&memory_pairs()).expect("config");
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.device_code_ttl_minutes, 15);
        assert_eq!(config.device_poll_interval_secs, 5);
        assert_eq!(config.join_token_ttl_hours, 24);
        assert_eq!(config.session_ttl_days, 7);
        assert_eq!(config.coordinator_url, "http://localhost:8080");
        assert_eq!(config.verification_url(), "http://localhost:8080/device");
        assert!(config.oidc.is_none());
    }

    #[test]
    fn short_join_token_secret_is_rejected() {
        let err = Config::from_pairs(&[
            ("STORE_BACKEND", "memory"),
            ("MESH_BACKEND", "memory"),
            ("JOIN_TOKEN_SECRET", "too-short"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("at least 32 bytes"));
    }

    #[test]
    fn postgres_backend_requires_database_url() {
        let err = Config::from_pairs(&[
            ("MESH_BACKEND", "memory"),
            ("JOIN_TOKEN_SECRET", SECRET),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn headscale_backend_requires_api_credentials() {
        let err = Config::from_pairs(&[
            ("STORE_BACKEND", "memory"),
            ("JOIN_TOKEN_SECRET", SECRET),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("MESH_API_URL"));
    }

    #[test]
    fn coordinator_url_trailing_slash_is_trimmed() {
        let mut pairs = memory_pairs();
        pairs.push(("COORDINATOR_URL", "https://coord.example.com/"));
        let config = Config::from_pairs(&pairs).expect("config");
        assert_eq!(config.coordinator_url, "https://coord.example.com");
        assert_eq!(config.cors_allow_origins, vec!["https://coord.example.com"]);
    }

    #[test]
    fn oidc_section_requires_client_id() {
        let mut pairs = memory_pairs();
        pairs.push(("OIDC_ISSUER", "https://idp.example.com"));
        assert!(Config::from_pairs(&pairs).is_err());

        pairs.push(("OIDC_CLIENT_ID", "meshrealm"));
        let config = Config::from_pairs(&pairs).expect("config");
        let oidc = config.oidc.expect("oidc");
        assert_eq!(oidc.redirect_url, "http://localhost:8080/auth/callback");
        assert_eq!(oidc.service_principal_claim, "service_principal");
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let mut pairs = memory_pairs();
        pairs.push(("SESSION_TTL_DAYS", "seven"));
        let err = Config::from_pairs(&pairs).unwrap_err();
        assert!(err.to_string().contains("SESSION_TTL_DAYS"));
    }
}
