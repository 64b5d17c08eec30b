use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    config::{Config, MeshBackend, StoreBackend},
    db::connection::create_pool,
    repositories::{
        memory::{
            MemoryApiKeyRepository, MemoryAuthStateRepository, MemoryDeviceRequestRepository,
            MemoryRealmRepository, MemoryServicePrincipalRepository, MemorySessionRepository,
        },
        ApiKeyRepository, AuthStateRepository, DeviceRequestRepository, PgApiKeyRepository,
        PgAuthStateRepository, PgDeviceRequestRepository, PgRealmRepository,
        PgServicePrincipalRepository, PgSessionRepository, RealmRepository,
        ServicePrincipalRepository, SessionRepository,
    },
    services::{
        auth::AuthService,
        device_auth::{DeviceAuthService, DeviceFlowSettings},
        identity::{IdentityGateway, OidcIdentityGateway, UnconfiguredIdentityGateway},
        join_token::{JoinTokenService, JoinTokenSettings},
        login::LoginService,
        mesh::{HeadscaleGateway, InMemoryMeshGateway, MeshGateway},
        nodes::NodeService,
        provisioning::RealmService,
        sweep::ExpirySweeper,
    },
    utils::jwt::JoinTokenCodec,
};

/// Every persistence contract, behind one backend.
#[derive(Clone)]
pub struct Stores {
    pub realms: Arc<dyn RealmRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
    pub device_requests: Arc<dyn DeviceRequestRepository>,
    pub auth_states: Arc<dyn AuthStateRepository>,
    pub service_principals: Arc<dyn ServicePrincipalRepository>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            realms: Arc::new(PgRealmRepository::new(pool.clone())),
            sessions: Arc::new(PgSessionRepository::new(pool.clone())),
            api_keys: Arc::new(PgApiKeyRepository::new(pool.clone())),
            device_requests: Arc::new(PgDeviceRequestRepository::new(pool.clone())),
            auth_states: Arc::new(PgAuthStateRepository::new(pool.clone())),
            service_principals: Arc::new(PgServicePrincipalRepository::new(pool)),
        }
    }

    /// Process-local stores; state is lost on restart and not shared between
    /// instances.
    pub fn memory() -> Self {
        Self {
            realms: Arc::new(MemoryRealmRepository::new()),
            sessions: Arc::new(MemorySessionRepository::new()),
            api_keys: Arc::new(MemoryApiKeyRepository::new()),
            device_requests: Arc::new(MemoryDeviceRequestRepository::new()),
            auth_states: Arc::new(MemoryAuthStateRepository::new()),
            service_principals: Arc::new(MemoryServicePrincipalRepository::new()),
        }
    }

    /// Opens the configured backend, running migrations for Postgres.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        match config.store_backend {
            StoreBackend::Postgres => {
                let pool =
                    create_pool(&config.database_url, config.database_max_connections).await?;
                sqlx::migrate!("./migrations").run(&pool).await?;
                Ok(Self::postgres(pool))
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory stores; state will not survive a restart");
                Ok(Self::memory())
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub realms: Arc<RealmService>,
    pub auth: Arc<AuthService>,
    pub login: Arc<LoginService>,
    pub devices: Arc<DeviceAuthService>,
    pub join_tokens: Arc<JoinTokenService>,
    pub nodes: Arc<NodeService>,
    pub sweeper: Arc<ExpirySweeper>,
}

impl AppState {
    /// Wires services over the given stores and collaborators.
    pub fn new(
        config: Config,
        stores: Stores,
        mesh: Arc<dyn MeshGateway>,
        identity: Arc<dyn IdentityGateway>,
    ) -> anyhow::Result<Self> {
        let realms = Arc::new(RealmService::new(
            stores.realms.clone(),
            stores.service_principals.clone(),
            mesh.clone(),
        ));
        let auth = Arc::new(AuthService::new(
            stores.sessions.clone(),
            stores.api_keys.clone(),
            stores.realms.clone(),
        ));
        let login = Arc::new(LoginService::new(
            identity,
            stores.auth_states.clone(),
            realms.clone(),
            auth.clone(),
            config.auth_state_ttl(),
            config.session_ttl(),
        ));
        let devices = Arc::new(DeviceAuthService::new(
            stores.device_requests.clone(),
            mesh.clone(),
            DeviceFlowSettings {
                code_ttl: config.device_code_ttl(),
                poll_interval_secs: config.device_poll_interval_secs,
                credential_ttl: config.join_credential_ttl(),
                verification_url: config.verification_url(),
            },
        ));
        let join_tokens = Arc::new(JoinTokenService::new(
            JoinTokenCodec::new(&config.join_token_secret)?,
            stores.realms.clone(),
            mesh.clone(),
            JoinTokenSettings {
                coordinator_url: config.coordinator_url.clone(),
                mesh_url: config.mesh_public_url.clone(),
                default_ttl: chrono::Duration::hours(config.join_token_ttl_hours as i64),
                max_ttl: chrono::Duration::hours(config.join_token_max_ttl_hours as i64),
                credential_ttl: config.join_credential_ttl(),
            },
        ));
        let nodes = Arc::new(NodeService::new(mesh));
        let sweeper = Arc::new(ExpirySweeper::new(
            stores.device_requests,
            stores.sessions,
            stores.auth_states,
        ));

        Ok(Self {
            config: Arc::new(config),
            realms,
            auth,
            login,
            devices,
            join_tokens,
            nodes,
            sweeper,
        })
    }

    /// Builds stores and collaborators from configuration.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let stores = Stores::connect(&config).await?;

        let mesh: Arc<dyn MeshGateway> = match config.mesh_backend {
            MeshBackend::Headscale => Arc::new(HeadscaleGateway::new(
                &config.mesh_api_url,
                &config.mesh_api_key,
                &config.mesh_public_url,
                config.mesh_timeout(),
            )?),
            MeshBackend::Memory => {
                tracing::warn!("Using in-memory mesh gateway; no real network is managed");
                Arc::new(InMemoryMeshGateway::new(&config.mesh_public_url))
            }
        };

        let identity: Arc<dyn IdentityGateway> = match config.oidc.clone() {
            Some(oidc) => Arc::new(OidcIdentityGateway::new(oidc)?),
            None => {
                tracing::warn!("No OIDC issuer configured; interactive login is disabled");
                Arc::new(UnconfiguredIdentityGateway)
            }
        };

        Self::new(config, stores, mesh, identity)
    }
}
