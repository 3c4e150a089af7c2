//! Audit record format and content hashing.
//!
//! `record_hash = SHA-256(prev_hash ‖ canonical(content))`, hex encoded.
//! The canonical form is the JSON serialization of every field except the
//! two hashes, in declaration order; snapshot object keys serialize sorted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::principal::{TenantId, UserId};

/// `prev_hash` of the first record in every tenant chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Security-relevant actions recorded by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    LoginSuccess,
    LoginFailure,
    TokenRefreshed,
    RefreshTokenReused,
    Logout,
    PasswordChanged,
    UserProvisioned,
    Correction,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::LoginSuccess => "login_success",
            AuditAction::LoginFailure => "login_failure",
            AuditAction::TokenRefreshed => "token_refreshed",
            AuditAction::RefreshTokenReused => "refresh_token_reused",
            AuditAction::Logout => "logout",
            AuditAction::PasswordChanged => "password_changed",
            AuditAction::UserProvisioned => "user_provisioned",
            AuditAction::Correction => "correction",
        }
    }
}

/// What a caller asks to have recorded. The logger assigns the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub tenant_id: TenantId,
    /// `None` for unauthenticated or system actions.
    pub actor_id: Option<UserId>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

impl AuditEvent {
    pub fn new(
        tenant_id: TenantId,
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            actor_id: None,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            before: None,
            after: None,
        }
    }

    pub fn with_actor(mut self, actor_id: UserId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_before(mut self, snapshot: Value) -> Self {
        self.before = Some(snapshot);
        self
    }

    pub fn with_after(mut self, snapshot: Value) -> Self {
        self.after = Some(snapshot);
        self
    }
}

/// One link in a tenant's chain. Never updated or deleted once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub sequence: u64,
    pub actor_id: Option<UserId>,
    pub timestamp_ms: u64,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    /// Id of the record this one corrects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrects: Option<Uuid>,
    pub prev_hash: String,
    pub record_hash: String,
}

#[derive(Serialize)]
struct CanonicalContent<'a> {
    id: &'a Uuid,
    tenant_id: &'a TenantId,
    sequence: u64,
    actor_id: &'a Option<UserId>,
    timestamp_ms: u64,
    action: &'a str,
    entity_type: &'a str,
    entity_id: &'a str,
    before: &'a Option<Value>,
    after: &'a Option<Value>,
    corrects: &'a Option<Uuid>,
}

impl AuditRecord {
    /// Hash of this record's content linked to its `prev_hash`.
    pub fn compute_hash(&self) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_vec(&CanonicalContent {
            id: &self.id,
            tenant_id: &self.tenant_id,
            sequence: self.sequence,
            actor_id: &self.actor_id,
            timestamp_ms: self.timestamp_ms,
            action: &self.action,
            entity_type: &self.entity_type,
            entity_id: &self.entity_id,
            before: &self.before,
            after: &self.after,
            corrects: &self.corrects,
        })?;

        let mut hasher = Sha256::new();
        hasher.update(self.prev_hash.as_bytes());
        hasher.update(&canonical);
        Ok(hex::encode(hasher.finalize()))
    }
}
