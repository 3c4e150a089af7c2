//! Bearer-token authentication for session routes.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::bootstrap::SecurityCore;
use crate::error::AuthFailure;
use crate::http::error::ApiError;
use crate::principal::TenantPrincipal;

/// Authenticated caller, inserted into request extensions.
#[derive(Clone)]
pub struct Session {
    pub principal: TenantPrincipal,
    /// The presented access token, kept for logout and password change.
    pub token: String,
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn require_session(
    State(core): State<Arc<SecurityCore>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()).map(str::to_owned) else {
        return ApiError::from(AuthFailure::TokenInvalid).into_response();
    };

    match core.auth.authenticate(&token) {
        Ok(principal) => {
            request.extensions_mut().insert(Session { principal, token });
            next.run(request).await
        }
        Err(failure) => ApiError::from(failure).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
