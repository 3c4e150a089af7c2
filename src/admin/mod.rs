//! Operator API.
//!
//! Every route requires `Authorization: Bearer <admin api key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::bootstrap::SecurityCore;

pub fn router(core: Arc<SecurityCore>) -> Router<Arc<SecurityCore>> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/audit/{tenant}/verify", get(verify_chain))
        .route("/admin/audit/{tenant}/records", get(get_records))
        .route("/admin/tenants/{tenant}/users", post(provision_user))
        .route_layer(middleware::from_fn_with_state(core, admin_auth_middleware))
}
