//! Credentials, session tokens and the flows that combine them.
//!
//! # Data Flow
//! ```text
//! service.rs (login, refresh, logout, password change, provisioning)
//!     → directory.rs (account lookup)
//!     → credentials.rs (Argon2id hash / verify)
//!     → tokens.rs (HS256 issue / validate / rotate)
//!         → revocation.rs (revoked ids and families)
//! ```

pub mod credentials;
pub mod directory;
pub mod revocation;
pub mod service;
pub mod tokens;

pub use credentials::{Credential, CredentialManager, VerifyOutcome};
pub use directory::{InMemoryUserDirectory, UserAccount, UserDirectory};
pub use service::AuthService;
pub use tokens::{SessionToken, TokenKind, TokenManager, TokenPair};
