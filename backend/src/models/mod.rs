//! Data models shared across persistence, services and API handlers.

pub mod api_key;
pub mod auth_state;
pub mod device_request;
pub mod identity;
pub mod join_token;
pub mod mesh;
pub mod realm;
pub mod service_principal;
pub mod session;
