#![allow(dead_code)]
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use meshrealm_backend::{
    app::build_router,
    config::Config,
    error::CoreError,
    models::identity::IdentityClaims,
    services::{identity::IdentityGateway, mesh::InMemoryMeshGateway},
    state::{AppState, Stores},
};
use serde_json::Value;
use tower::ServiceExt;

pub const JOIN_TOKEN_SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const ADMIN_TOKEN: &str = "admin-token-admin-token-admin-token";
pub const IDP_AUTHORIZE_URL: &str = "https://idp.test/authorize";

/// Identity provider stand-in.
///
/// Codes and ID tokens have the form `human:<subject>` or
/// `service:<subject>`; anything else is rejected.
pub struct FakeIdentity;

fn claims_from(raw: &str) -> Result<IdentityClaims, CoreError> {
    match raw.split_once(':') {
        Some(("human", subject)) if !subject.is_empty() => Ok(IdentityClaims::human(subject)),
        Some(("service", subject)) if !subject.is_empty() => {
            Ok(IdentityClaims::service(subject))
        }
        _ => Err(CoreError::InvalidIdentityToken("unknown test token".into())),
    }
}

#[async_trait]
impl IdentityGateway for FakeIdentity {
    async fn authorization_url(&self, state: &str, nonce: &str) -> Result<String, CoreError> {
        Ok(format!(
            "{}?state={}&nonce={}",
            IDP_AUTHORIZE_URL, state, nonce
        ))
    }

    async fn exchange_code(&self, code: &str, _nonce: &str) -> Result<IdentityClaims, CoreError> {
        claims_from(code)
    }

    async fn validate_id_token<'a>(
        &self,
        id_token: &str,
        _nonce: Option<&'a str>,
    ) -> Result<IdentityClaims, CoreError> {
        claims_from(id_token)
    }
}

pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let mut pairs = vec![
        ("STORE_BACKEND", "memory"),
        ("MESH_BACKEND", "memory"),
        ("MESH_PUBLIC_URL", "https://mesh.test"),
        ("COORDINATOR_URL", "https://coordinator.test"),
        ("JOIN_TOKEN_SECRET", JOIN_TOKEN_SECRET),
        ("COOKIE_SECURE", "false"),
        ("ADMIN_TOKEN", ADMIN_TOKEN),
    ];
    pairs.extend_from_slice(extra);
    Config::from_pairs(&pairs).expect("test config")
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub stores: Stores,
    pub mesh: Arc<InMemoryMeshGateway>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config(&[]))
    }

    pub fn with_config(config: Config) -> Self {
        let stores = Stores::memory();
        let mesh = Arc::new(InMemoryMeshGateway::new("https://mesh.test"));
        let state = AppState::new(config, stores.clone(), mesh.clone(), Arc::new(FakeIdentity))
            .expect("app state");
        Self {
            router: build_router(state.clone()),
            state,
            stores,
            mesh,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            json,
        }
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        self.send(request).await
    }

    /// Machine login for a human subject; returns the session token.
    pub async fn login(&self, subject: &str) -> String {
        let response = self
            .call(
                Method::POST,
                "/auth/token",
                None,
                Some(serde_json::json!({ "id_token": format!("human:{}", subject) })),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login: {}", response.json);
        response.json["session_token"]
            .as_str()
            .expect("session_token")
            .to_string()
    }

    pub async fn realm_namespace(&self, session: &str) -> String {
        let response = self.call(Method::GET, "/api/v1/realm", Some(session), None).await;
        assert_eq!(response.status, StatusCode::OK);
        response.json["mesh_namespace"]
            .as_str()
            .expect("mesh_namespace")
            .to_string()
    }

    pub async fn create_api_key(&self, session: &str, name: &str) -> String {
        let response = self
            .call(
                Method::POST,
                "/api/v1/api-keys",
                Some(session),
                Some(serde_json::json!({ "name": name })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.json);
        response.json["key"].as_str().expect("key").to_string()
    }

    pub async fn join_token(&self, session: &str) -> String {
        let response = self
            .call(
                Method::POST,
                "/api/v1/join-token",
                Some(session),
                Some(serde_json::json!({})),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.json);
        response.json["token"].as_str().expect("token").to_string()
    }
}
