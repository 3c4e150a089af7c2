//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! Ctrl+C (shutdown.rs)
//!     → Shutdown::trigger
//!     → HTTP server stops accepting, drains in-flight requests
//!     → maintenance.rs loop exits
//! ```

pub mod maintenance;
pub mod shutdown;

pub use maintenance::spawn_maintenance;
pub use shutdown::Shutdown;
