//! Mapping of security errors onto HTTP responses.
//!
//! Authentication failures share one generic body; the specific cause is
//! only logged. Integrity and storage failures are never masked as auth
//! failures.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::{AuthFailure, SecurityError, ValidationError};
use crate::security::rate_limit::too_many_requests;

#[derive(Debug)]
pub struct ApiError(pub SecurityError);

impl From<SecurityError> for ApiError {
    fn from(err: SecurityError) -> Self {
        Self(err)
    }
}

impl From<AuthFailure> for ApiError {
    fn from(err: AuthFailure) -> Self {
        Self(err.into())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            SecurityError::Validation(err) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "invalid_request",
                    "field": err.field(),
                    "reason": err.reason(),
                })),
            )
                .into_response(),
            SecurityError::Auth(AuthFailure::RateLimited { retry_after }) => too_many_requests(retry_after),
            SecurityError::Auth(AuthFailure::TenantMismatch) => {
                tracing::warn!("Cross-tenant access denied");
                (StatusCode::FORBIDDEN, Json(json!({ "error": "forbidden" }))).into_response()
            }
            SecurityError::Auth(failure) => {
                tracing::warn!(cause = %failure, "Authentication failed");
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" }))).into_response()
            }
            other => {
                tracing::error!(error = %other, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal_error" })),
                )
                    .into_response()
            }
        }
    }
}
