use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::Config,
    docs::ApiDoc,
    handlers,
    middleware::{self as app_middleware, API_KEY_HEADER, REQUEST_ID_HEADER},
    state::AppState,
};

/// Assembles every route with its credential guard and the shared layers.
pub fn build_router(state: AppState) -> Router {
    // No credentials
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/device/code", post(handlers::device::device_code))
        .route("/device/token", post(handlers::device::device_token))
        .route(
            "/api/v1/join-token/inspect",
            post(handlers::join_token::inspect_join_token),
        )
        .route("/api/v1/worker/join", post(handlers::join_token::worker_join))
        .route("/auth/login", get(handlers::auth::login))
        .route("/auth/callback", get(handlers::auth::callback))
        .route("/auth/token", post(handlers::auth::token));

    // Credential-minting operations: an API key must not be able to mint
    // further credentials.
    let session_routes = Router::new()
        .route("/device/verify", post(handlers::device::device_verify))
        .route(
            "/api/v1/join-token",
            post(handlers::join_token::create_join_token),
        )
        .route("/api/v1/api-keys", post(handlers::api_keys::create_api_key))
        .route("/api/v1/nodes/{id}", delete(handlers::nodes::delete_node))
        .route("/auth/logout", post(handlers::auth::logout))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            app_middleware::require_session,
        ));

    let realm_routes = Router::new()
        .route("/api/v1/realm", get(handlers::realm::get_realm))
        .route("/api/v1/api-keys", get(handlers::api_keys::list_api_keys))
        .route(
            "/api/v1/api-keys/{id}",
            delete(handlers::api_keys::delete_api_key),
        )
        .route("/api/v1/nodes", get(handlers::nodes::list_nodes))
        .route("/api/v1/nodes/{id}", get(handlers::nodes::get_node))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            app_middleware::require_any,
        ));

    let api_key_routes = Router::new()
        .route(
            "/api/v1/api-keys/self",
            get(handlers::api_keys::current_api_key),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            app_middleware::require_api_key,
        ));

    let admin_routes = Router::new()
        .route(
            "/api/v1/admin/realms/{id}",
            delete(handlers::admin::delete_realm),
        )
        .route(
            "/api/v1/admin/service-principals",
            post(handlers::admin::bind_service_principal),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            app_middleware::require_admin,
        ));

    let cors = cors_layer(&state.config);
    let request_timeout = state.config.request_timeout();

    Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .merge(realm_routes)
        .merge(api_key_routes)
        .merge(admin_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(app_middleware::request_id))
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(app_middleware::log_error_responses))
                .layer(TimeoutLayer::new(request_timeout))
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allow_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(API_KEY_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(24 * 60 * 60))
}
