use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::bootstrap::SecurityCore;
use crate::http::middleware::bearer_token;

pub async fn admin_auth_middleware(
    State(core): State<Arc<SecurityCore>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    match bearer_token(request.headers()) {
        Some(key) if core.admin_key_matches(key) => Ok(next.run(request).await),
        _ => {
            tracing::warn!(path = %request.uri().path(), "Admin request rejected");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
