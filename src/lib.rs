//! Security and audit core for a multi-tenant compliance backend.

pub mod admin;
pub mod audit;
pub mod auth;
pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod principal;
pub mod security;

pub use bootstrap::SecurityCore;
pub use config::SecurityConfig;
pub use error::{SecurityError, SecurityResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
