//! Authentication endpoint handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::TokenPair;
use crate::bootstrap::SecurityCore;
use crate::http::error::ApiError;
use crate::http::middleware::Session;
use crate::principal::{Role, TenantId, UserId};
use crate::security::validator::parse_tenant_id;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub tenant_id: String,
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_expires_in: u64,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            expires_in: pair.access.lifetime_secs(),
            refresh_expires_in: pair.refresh.lifetime_secs(),
            access_token: pair.access.encoded().to_string(),
            refresh_token: pair.refresh.encoded().to_string(),
            token_type: "Bearer".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn login(
    State(core): State<Arc<SecurityCore>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let tenant_id = parse_tenant_id(&body.tenant_id)?;
    let pair = core
        .auth
        .login(&addr.ip().to_string(), tenant_id, &body.username, &body.password)
        .await?;
    Ok(Json(pair.into()))
}

pub async fn refresh(
    State(core): State<Arc<SecurityCore>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let pair = core
        .auth
        .refresh(&addr.ip().to_string(), &body.refresh_token)
        .await?;
    Ok(Json(pair.into()))
}

pub async fn logout(
    State(core): State<Arc<SecurityCore>>,
    Extension(session): Extension<Session>,
) -> Result<StatusCode, ApiError> {
    core.auth.logout(&session.principal, &session.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn change_password(
    State(core): State<Arc<SecurityCore>>,
    Extension(session): Extension<Session>,
    Json(body): Json<PasswordChangeRequest>,
) -> Result<StatusCode, ApiError> {
    core.auth
        .change_password(
            &session.principal,
            &session.token,
            &body.current_password,
            &body.new_password,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn session(Extension(session): Extension<Session>) -> Json<SessionResponse> {
    Json(SessionResponse {
        tenant_id: session.principal.tenant_id(),
        user_id: session.principal.user_id(),
        role: session.principal.role(),
    })
}
