//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the security core.
//! All types derive Serde traits for deserialization from config files.
//! Key material is not part of the file; see `config::secrets`.

use serde::{Deserialize, Serialize};

/// Root configuration for the security service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Session token lifetimes and issuer.
    pub tokens: TokenConfig,

    /// Password hashing cost profile.
    pub credentials: CredentialConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Audit store settings.
    pub audit: AuditConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrently handled requests (backpressure).
    pub max_concurrent_requests: usize,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
            tls: None,
            max_concurrent_requests: 1_024,
            max_body_bytes: 64 * 1024,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Session token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Value of the `iss` claim; tokens from another issuer are invalid.
    pub issuer: String,

    /// Access token lifetime in seconds.
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds.
    pub refresh_ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "compliance-security".to_string(),
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

/// Argon2id cost profile.
///
/// Bump `algorithm_version` whenever the cost parameters change so stored
/// credentials are re-hashed on their next successful login.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub algorithm_version: u16,
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            algorithm_version: 1,
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Budget for one route class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct WindowPolicy {
    /// Requests allowed per window.
    pub limit: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl WindowPolicy {
    pub fn window_ms(&self) -> u64 {
        self.window_secs.saturating_mul(1000)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    pub login: WindowPolicy,
    pub password_reset: WindowPolicy,
    pub token_refresh: WindowPolicy,
    pub general: WindowPolicy,

    /// Interval of the expired bucket / revocation sweep in seconds.
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            login: WindowPolicy {
                limit: 5,
                window_secs: 60,
            },
            password_reset: WindowPolicy {
                limit: 3,
                window_secs: 15 * 60,
            },
            token_refresh: WindowPolicy {
                limit: 30,
                window_secs: 60,
            },
            general: WindowPolicy {
                limit: 300,
                window_secs: 60,
            },
            cleanup_interval_secs: 30,
        }
    }
}

/// Where audit records are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStoreKind {
    /// Process memory; for tests and ephemeral deployments.
    Memory,
    /// One JSON-lines file per tenant, synced on every append.
    File,
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    pub store: AuditStoreKind,

    /// Directory holding the per-tenant chain files.
    pub directory: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            store: AuditStoreKind::File,
            directory: "./audit".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Operator API configuration.
///
/// The API key itself comes from the secret environment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the `/admin` routes.
    pub enabled: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SecurityConfig = toml::from_str(
            r#"
            [tokens]
            access_ttl_secs = 300

            [rate_limit.login]
            limit = 10
            window_secs = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.tokens.access_ttl_secs, 300);
        assert_eq!(config.tokens.refresh_ttl_secs, 7 * 24 * 60 * 60);
        assert_eq!(config.rate_limit.login.limit, 10);
        assert_eq!(config.rate_limit.general.limit, 300);
        assert_eq!(config.audit.store, AuditStoreKind::File);
    }

    #[test]
    fn test_default_login_budget() {
        let config = RateLimitConfig::default();
        assert_eq!(config.login.limit, 5);
        assert_eq!(config.login.window_secs, 60);
    }
}
