pub mod admin;
pub mod api_keys;
pub mod auth;
pub mod device;
pub mod health;
pub mod join_token;
pub mod nodes;
pub mod realm;
