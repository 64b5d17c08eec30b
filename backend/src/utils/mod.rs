pub mod cookies;
pub mod jwt;
pub mod secrets;

pub use jwt::*;
pub use secrets::*;
