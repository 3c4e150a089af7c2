//! Error taxonomy for the security core.
//!
//! # Categories
//! - `Validation`: malformed input or policy violation, reported with a reason code
//! - `Auth`: credential, token, tenant or rate-limit rejection, reported generically
//! - `Integrity`: decryption or audit-chain failure, always surfaced
//! - `Configuration`: missing or malformed key material, fatal at startup
//! - `Storage`: the durable audit store could not append or scan

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::principal::TenantId;

/// Machine-readable reason attached to a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Empty,
    TooShort,
    TooLong,
    InvalidCharacter,
    InvalidFormat,
    TooDeep,
    MissingDigit,
    MissingUppercase,
    /// Refers to something that does not exist.
    UnknownReference,
    /// Already taken.
    Conflict,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Empty => "empty",
            ReasonCode::TooShort => "too_short",
            ReasonCode::TooLong => "too_long",
            ReasonCode::InvalidCharacter => "invalid_character",
            ReasonCode::InvalidFormat => "invalid_format",
            ReasonCode::TooDeep => "too_deep",
            ReasonCode::MissingDigit => "missing_digit",
            ReasonCode::MissingUppercase => "missing_uppercase",
            ReasonCode::UnknownReference => "unknown_reference",
            ReasonCode::Conflict => "conflict",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Malformed input or policy violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("weak password: {0}")]
    WeakPassword(ReasonCode),

    #[error("invalid {field}: {reason}")]
    Malformed {
        field: &'static str,
        reason: ReasonCode,
    },
}

impl ValidationError {
    pub fn malformed(field: &'static str, reason: ReasonCode) -> Self {
        ValidationError::Malformed { field, reason }
    }

    /// The input field the failure refers to.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::WeakPassword(_) => "password",
            ValidationError::Malformed { field, .. } => field,
        }
    }

    pub fn reason(&self) -> ReasonCode {
        match self {
            ValidationError::WeakPassword(reason) => *reason,
            ValidationError::Malformed { reason, .. } => *reason,
        }
    }
}

/// Authentication or authorization rejection.
///
/// The variant is for logs and callers inside the process; responses to
/// clients must not reveal which check failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("invalid credentials")]
    BadCredentials,

    #[error("token expired")]
    TokenExpired,

    #[error("token invalid")]
    TokenInvalid,

    #[error("token revoked")]
    TokenRevoked,

    /// A refresh token that was already rotated out was presented again.
    #[error("refresh token reused")]
    RefreshTokenReused,

    #[error("principal is not authorized for the requested tenant")]
    TenantMismatch,

    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },
}

/// Failure of a cryptographic integrity guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityFailure {
    #[error("decryption failed for key version {key_version}")]
    Decryption { key_version: u32 },

    #[error("audit chain broken for tenant {tenant_id} at index {index}")]
    ChainBroken { tenant_id: TenantId, index: u64 },
}

/// Missing or unusable key material and settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationFailure {
    #[error("missing secret {0}")]
    MissingSecret(&'static str),

    #[error("invalid secret {name}: {reason}")]
    InvalidSecret { name: &'static str, reason: String },

    #[error("unknown key version {0}")]
    UnknownKeyVersion(u32),

    #[error("key version {0} is read-only")]
    ReadOnlyKey(u32),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Durable audit store failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt audit store for tenant {tenant_id} at line {line}")]
    Corrupt { tenant_id: TenantId, line: usize },
}

/// Top-level error for every security operation.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthFailure),

    #[error(transparent)]
    Integrity(#[from] IntegrityFailure),

    #[error(transparent)]
    Configuration(#[from] ConfigurationFailure),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A worker task died; the operation did not complete.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for security operations.
pub type SecurityResult<T> = Result<T, SecurityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ValidationError::malformed("username", ReasonCode::TooLong);
        assert_eq!(err.to_string(), "invalid username: too_long");
        assert_eq!(err.field(), "username");

        let err = ValidationError::WeakPassword(ReasonCode::MissingDigit);
        assert_eq!(err.field(), "password");
        assert_eq!(err.reason(), ReasonCode::MissingDigit);

        let err = AuthFailure::RateLimited {
            retry_after: Duration::from_secs(42),
        };
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_categories_convert() {
        let err: SecurityError = AuthFailure::TokenExpired.into();
        assert!(matches!(err, SecurityError::Auth(AuthFailure::TokenExpired)));

        let err: SecurityError = IntegrityFailure::Decryption { key_version: 3 }.into();
        assert_eq!(err.to_string(), "decryption failed for key version 3");
    }
}
