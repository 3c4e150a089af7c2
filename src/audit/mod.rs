//! Tamper-evident audit trail.
//!
//! # Data Flow
//! ```text
//! Security flows (login, refresh, provisioning)
//!     → logger.rs (validate, chain, append under the tenant lock)
//!     → store.rs (memory or JSON-lines, durable before returning)
//!
//! Operators
//!     → logger.rs verify_chain (replay from genesis)
//! ```

pub mod logger;
pub mod record;
pub mod store;

pub use logger::{AuditLogger, BrokenLink, ChainFault, ChainVerification};
pub use record::{AuditAction, AuditEvent, AuditRecord, GENESIS_HASH};
pub use store::{AuditStore, JsonlAuditStore, MemoryAuditStore};
