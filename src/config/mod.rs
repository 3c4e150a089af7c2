//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → SecurityConfig (validated, immutable)
//!     → passed to component constructors at startup
//!
//! environment
//!     → secrets.rs (key material, zeroized on drop)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → rate limiter policies swapped atomically
//! ```
//!
//! # Design Decisions
//! - Secrets never live in the config file
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod secrets;
pub mod validation;
pub mod watcher;

pub use schema::SecurityConfig;
pub use schema::{
    AuditConfig, AuditStoreKind, CredentialConfig, ListenerConfig, ObservabilityConfig,
    RateLimitConfig, TokenConfig, WindowPolicy,
};
pub use secrets::KeyMaterial;
