//! Request middleware specific to the security surface.

pub mod session;

pub use session::{bearer_token, require_session, Session};
