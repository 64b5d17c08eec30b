#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::{
    handlers::{
        auth::{CallbackQuery, LoginQuery},
        device::DeviceTokenError,
    },
    models::{
        api_key::{ApiKeyResponse, CreateApiKeyRequest, CreateApiKeyResponse},
        device_request::{
            DeviceCodeResponse, DeviceStatus, DeviceTokenRequest, DeviceVerifyAction,
            DeviceVerifyRequest, DeviceVerifyResponse,
        },
        join_token::{
            CreateJoinTokenRequest, JoinTokenInspection, JoinTokenPayload, JoinTokenResponse,
            WorkerJoinResponse,
        },
        mesh::{JoinCredential, MeshNode},
        realm::RealmResponse,
        service_principal::{BindServicePrincipalRequest, ServicePrincipal},
        session::{IdTokenLoginRequest, SessionTokenResponse},
    },
    utils::jwt::JoinTokenClaims,
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        device_code_doc,
        device_verify_doc,
        device_token_doc,
        create_join_token_doc,
        inspect_join_token_doc,
        worker_join_doc,
        create_api_key_doc,
        list_api_keys_doc,
        delete_api_key_doc,
        current_api_key_doc,
        list_nodes_doc,
        get_node_doc,
        delete_node_doc,
        get_realm_doc,
        login_doc,
        callback_doc,
        token_login_doc,
        logout_doc,
        admin_delete_realm_doc,
        admin_bind_service_principal_doc
    ),
    components(
        schemas(
            // device flow
            DeviceCodeResponse,
            DeviceStatus,
            DeviceTokenRequest,
            DeviceTokenError,
            DeviceVerifyAction,
            DeviceVerifyRequest,
            DeviceVerifyResponse,
            // join tokens
            CreateJoinTokenRequest,
            JoinTokenClaims,
            JoinTokenInspection,
            JoinTokenPayload,
            JoinTokenResponse,
            JoinCredential,
            WorkerJoinResponse,
            // realm & nodes
            RealmResponse,
            MeshNode,
            // api keys
            ApiKeyResponse,
            CreateApiKeyRequest,
            CreateApiKeyResponse,
            // login
            IdTokenLoginRequest,
            SessionTokenResponse,
            LoginQuery,
            CallbackQuery,
            // admin
            BindServicePrincipalRequest,
            ServicePrincipal
        )
    ),
    modifiers(&SecuritySchemes),
    tags(
        (name = "Device", description = "Device authorization for workers"),
        (name = "JoinToken", description = "Join-token issuance and exchange"),
        (name = "ApiKeys", description = "Realm-scoped API keys"),
        (name = "Realm", description = "Realm and mesh node views"),
        (name = "Auth", description = "Login and logout"),
        (name = "Admin", description = "Operator API")
    ),
    security(("BearerAuth" = []), ("ApiKeyAuth" = []))
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();

        components.add_security_scheme(
            "BearerAuth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
        components.add_security_scheme(
            "ApiKeyAuth",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
        );
        components.add_security_scheme(
            "AdminToken",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Admin-Token"))),
        );
    }
}

#[utoipa::path(
    post,
    path = "/device/code",
    responses((status = 200, body = DeviceCodeResponse)),
    tag = "Device",
    security(())
)]
fn device_code_doc() {}

#[utoipa::path(
    post,
    path = "/device/verify",
    request_body = DeviceVerifyRequest,
    responses(
        (status = 200, body = DeviceVerifyResponse),
        (status = 400, description = "Malformed or already used code"),
        (status = 401, description = "Session required"),
        (status = 404, description = "Unknown or expired code")
    ),
    tag = "Device",
    security(("BearerAuth" = []))
)]
fn device_verify_doc() {}

#[utoipa::path(
    post,
    path = "/device/token",
    request_body = DeviceTokenRequest,
    responses(
        (status = 200, description = "Approved; credential delivered once", body = WorkerJoinResponse),
        (status = 202, description = "authorization_pending", body = DeviceTokenError),
        (status = 403, description = "access_denied", body = DeviceTokenError),
        (status = 410, description = "expired_token", body = DeviceTokenError),
        (status = 400, description = "Malformed device code"),
        (status = 404, description = "Unknown or already consumed")
    ),
    tag = "Device",
    security(())
)]
fn device_token_doc() {}

#[utoipa::path(
    post,
    path = "/api/v1/join-token",
    request_body = CreateJoinTokenRequest,
    responses(
        (status = 200, description = "Reusable until expires_at", body = JoinTokenResponse),
        (status = 401, description = "Session required")
    ),
    tag = "JoinToken",
    security(("BearerAuth" = []))
)]
fn create_join_token_doc() {}

#[utoipa::path(
    post,
    path = "/api/v1/join-token/inspect",
    request_body = JoinTokenPayload,
    responses((status = 200, description = "Unverified claims", body = JoinTokenInspection)),
    tag = "JoinToken",
    security(())
)]
fn inspect_join_token_doc() {}

#[utoipa::path(
    post,
    path = "/api/v1/worker/join",
    request_body = JoinTokenPayload,
    responses(
        (status = 200, body = WorkerJoinResponse),
        (status = 401, description = "Invalid or expired token")
    ),
    tag = "JoinToken",
    security(())
)]
fn worker_join_doc() {}

#[utoipa::path(
    post,
    path = "/api/v1/api-keys",
    request_body = CreateApiKeyRequest,
    responses((status = 201, body = CreateApiKeyResponse)),
    tag = "ApiKeys",
    security(("BearerAuth" = []))
)]
fn create_api_key_doc() {}

#[utoipa::path(
    get,
    path = "/api/v1/api-keys",
    responses((status = 200, body = [ApiKeyResponse])),
    tag = "ApiKeys"
)]
fn list_api_keys_doc() {}

#[utoipa::path(
    delete,
    path = "/api/v1/api-keys/{id}",
    params(("id" = String, Path, description = "API key id")),
    responses((status = 204), (status = 404)),
    tag = "ApiKeys"
)]
fn delete_api_key_doc() {}

#[utoipa::path(
    get,
    path = "/api/v1/api-keys/self",
    responses((status = 200, body = ApiKeyResponse)),
    tag = "ApiKeys",
    security(("ApiKeyAuth" = []))
)]
fn current_api_key_doc() {}

#[utoipa::path(
    get,
    path = "/api/v1/nodes",
    responses((status = 200, body = [MeshNode])),
    tag = "Realm"
)]
fn list_nodes_doc() {}

#[utoipa::path(
    get,
    path = "/api/v1/nodes/{id}",
    params(("id" = String, Path, description = "Node id")),
    responses((status = 200, body = MeshNode), (status = 404)),
    tag = "Realm"
)]
fn get_node_doc() {}

#[utoipa::path(
    delete,
    path = "/api/v1/nodes/{id}",
    params(("id" = String, Path, description = "Node id")),
    responses((status = 204), (status = 404)),
    tag = "Realm",
    security(("BearerAuth" = []))
)]
fn delete_node_doc() {}

#[utoipa::path(
    get,
    path = "/api/v1/realm",
    responses((status = 200, body = RealmResponse)),
    tag = "Realm"
)]
fn get_realm_doc() {}

#[utoipa::path(
    get,
    path = "/auth/login",
    params(LoginQuery),
    responses((status = 303, description = "Redirect to the identity provider")),
    tag = "Auth",
    security(())
)]
fn login_doc() {}

#[utoipa::path(
    get,
    path = "/auth/callback",
    params(CallbackQuery),
    responses(
        (status = 303, description = "Session cookie set; redirect to return path"),
        (status = 403, description = "Unknown, reused or stale state")
    ),
    tag = "Auth",
    security(())
)]
fn callback_doc() {}

#[utoipa::path(
    post,
    path = "/auth/token",
    request_body = IdTokenLoginRequest,
    responses(
        (status = 200, body = SessionTokenResponse),
        (status = 401, description = "ID token rejected")
    ),
    tag = "Auth",
    security(())
)]
fn token_login_doc() {}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Session ended; cookie cleared")),
    tag = "Auth",
    security(("BearerAuth" = []))
)]
fn logout_doc() {}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/realms/{id}",
    params(("id" = String, Path, description = "Realm id")),
    responses((status = 204), (status = 404)),
    tag = "Admin",
    security(("AdminToken" = []))
)]
fn admin_delete_realm_doc() {}

#[utoipa::path(
    post,
    path = "/api/v1/admin/service-principals",
    request_body = BindServicePrincipalRequest,
    responses((status = 201, body = ServicePrincipal), (status = 404)),
    tag = "Admin",
    security(("AdminToken" = []))
)]
fn admin_bind_service_principal_doc() {}
