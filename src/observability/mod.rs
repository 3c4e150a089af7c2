//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Security components produce:
//!     → logging.rs (structured log events, never secrets)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (log aggregation)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every HTTP log line
//! - Metrics are cheap; recording with no installed exporter is a no-op

pub mod logging;
pub mod metrics;
