use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditRecord, ChainVerification};
use crate::bootstrap::SecurityCore;
use crate::crypto::KeyState;
use crate::error::{SecurityError, SecurityResult};
use crate::http::error::ApiError;
use crate::principal::{Role, TenantId, UserId};
use crate::security::validator::parse_tenant_id;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub audit_tenants: usize,
    pub rate_buckets: usize,
    pub revoked_tokens: usize,
    pub users: usize,
    pub cipher_active_version: u32,
    pub cipher_keys: Vec<KeyVersionStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyVersionStatus {
    pub version: u32,
    pub state: String,
}

#[derive(Deserialize)]
pub struct ProvisionRequest {
    pub username: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProvisionResponse {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
}

/// Store reads touch the filesystem; keep them off the async workers.
async fn on_blocking_pool<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> SecurityResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SecurityError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

pub async fn get_status(State(core): State<Arc<SecurityCore>>) -> Result<Json<SystemStatus>, ApiError> {
    let audit = core.audit.clone();
    let audit_tenants = on_blocking_pool(move || audit.tenants()).await?.len();
    let cipher_keys = core
        .cipher
        .key_versions()
        .into_iter()
        .map(|(version, state)| KeyVersionStatus {
            version,
            state: match state {
                KeyState::Active => "active",
                KeyState::ReadOnly => "read_only",
            }
            .to_string(),
        })
        .collect();

    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        audit_tenants,
        rate_buckets: core.limiter.tracked_buckets(),
        revoked_tokens: core.tokens.revoked_entries(),
        users: core.directory.len(),
        cipher_active_version: core.cipher.active_version(),
        cipher_keys,
    }))
}

pub async fn verify_chain(
    State(core): State<Arc<SecurityCore>>,
    Path(tenant): Path<String>,
) -> Result<Json<ChainVerification>, ApiError> {
    let tenant_id = parse_tenant_id(&tenant)?;
    let audit = core.audit.clone();
    let verification = on_blocking_pool(move || audit.verify_chain(tenant_id)).await?;
    Ok(Json(verification))
}

pub async fn get_records(
    State(core): State<Arc<SecurityCore>>,
    Path(tenant): Path<String>,
) -> Result<Json<Vec<AuditRecord>>, ApiError> {
    let tenant_id = parse_tenant_id(&tenant)?;
    let audit = core.audit.clone();
    Ok(Json(on_blocking_pool(move || audit.records(tenant_id)).await?))
}

pub async fn provision_user(
    State(core): State<Arc<SecurityCore>>,
    Path(tenant): Path<String>,
    Json(body): Json<ProvisionRequest>,
) -> Result<(StatusCode, Json<ProvisionResponse>), ApiError> {
    let tenant_id = parse_tenant_id(&tenant)?;
    let principal = core
        .auth
        .provision_user(tenant_id, &body.username, &body.password, body.role, None)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ProvisionResponse {
            tenant_id: principal.tenant_id(),
            user_id: principal.user_id(),
            role: principal.role(),
        }),
    ))
}
