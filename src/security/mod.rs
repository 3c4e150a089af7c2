//! Abuse control and input gating.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-identity, per-route-class budget)
//!     → validator.rs (structural checks on untrusted input)
//!     → credential / token / audit components
//! ```
//!
//! # Design Decisions
//! - Fail closed: a denied request is rejected before any credential check
//! - No trust in client input

pub mod rate_limit;
pub mod validator;

pub use rate_limit::{Decision, RateLimiter, RouteClass};
