pub mod auth;
pub mod device_auth;
pub mod identity;
pub mod join_token;
pub mod login;
pub mod mesh;
pub mod nodes;
pub mod provisioning;
pub mod sweep;
