//! HTTP surface of the security core.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (request ID, trace, timeout, body limit, concurrency, rate limit)
//!     → middleware/session.rs (bearer token → Session) for session routes
//!     → handlers.rs / admin
//!     → error.rs (SecurityError → status code, generic auth body)
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, HttpServer};
