//! Wiring of the security components.
//!
//! # Design Decisions
//! - Key material is consumed here and never stored whole afterwards
//! - One clock instance is shared by every component
//! - Startup fails on any configuration or storage error

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::audit::{AuditLogger, AuditStore, JsonlAuditStore, MemoryAuditStore};
use crate::auth::{AuthService, CredentialManager, InMemoryUserDirectory, TokenManager, UserDirectory};
use crate::clock::Clock;
use crate::config::{AuditConfig, AuditStoreKind, KeyMaterial, SecurityConfig};
use crate::crypto::CipherService;
use crate::error::{SecurityResult, StorageError};
use crate::security::RateLimiter;

/// Result of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub buckets_purged: usize,
    pub revocations_purged: usize,
}

/// Every security component, built once at startup and shared.
pub struct SecurityCore {
    pub config: SecurityConfig,
    pub clock: Arc<dyn Clock>,
    pub cipher: Arc<CipherService>,
    pub limiter: Arc<RateLimiter>,
    pub tokens: Arc<TokenManager>,
    pub audit: Arc<AuditLogger>,
    pub directory: Arc<dyn UserDirectory>,
    pub auth: Arc<AuthService>,
    admin_key_digest: Option<[u8; 32]>,
}

impl SecurityCore {
    pub fn build(
        config: SecurityConfig,
        keys: &KeyMaterial,
        store: Arc<dyn AuditStore>,
        clock: Arc<dyn Clock>,
    ) -> SecurityResult<Self> {
        let cipher = Arc::new(CipherService::new(keys));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit, clock.clone()));
        let credentials = Arc::new(CredentialManager::new(&config.credentials)?);
        let tokens = Arc::new(TokenManager::new(&config.tokens, keys, clock.clone()));
        let audit = Arc::new(AuditLogger::new(store, clock.clone()));
        let directory: Arc<dyn UserDirectory> = Arc::new(InMemoryUserDirectory::new());

        let auth = Arc::new(AuthService::new(
            limiter.clone(),
            credentials,
            tokens.clone(),
            audit.clone(),
            directory.clone(),
        ));

        let admin_key_digest = keys.admin_api_key().map(digest);
        if config.admin.enabled && admin_key_digest.is_none() {
            tracing::warn!("Admin API enabled without an API key; admin routes will reject every request");
        }

        tracing::info!(
            cipher_active_version = cipher.active_version(),
            cipher_key_versions = cipher.key_versions().len(),
            credential_profile = config.credentials.algorithm_version,
            "Security core initialized"
        );

        Ok(Self {
            config,
            clock,
            cipher,
            limiter,
            tokens,
            audit,
            directory,
            auth,
            admin_key_digest,
        })
    }

    /// Open the audit store named by the configuration.
    pub fn open_store(config: &AuditConfig) -> Result<Arc<dyn AuditStore>, StorageError> {
        Ok(match config.store {
            AuditStoreKind::Memory => {
                tracing::warn!("Audit records are kept in memory only");
                Arc::new(MemoryAuditStore::new())
            }
            AuditStoreKind::File => Arc::new(JsonlAuditStore::open(&config.directory)?),
        })
    }

    /// Check a presented admin API key. Compares SHA-256 digests in constant time.
    pub fn admin_key_matches(&self, presented: &str) -> bool {
        match &self.admin_key_digest {
            Some(expected) => constant_time_eq(expected, &digest(presented)),
            None => false,
        }
    }

    /// Purge expired rate-limit buckets and revocation entries.
    pub fn run_maintenance(&self) -> MaintenanceReport {
        MaintenanceReport {
            buckets_purged: self.limiter.purge_expired(),
            revocations_purged: self.tokens.purge_expired(),
        }
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::CredentialConfig;
    use crate::security::RouteClass;
    use std::collections::BTreeMap;

    fn build_core(admin_key: Option<&str>) -> (SecurityCore, ManualClock) {
        let clock = ManualClock::new(0);
        let mut keys = KeyMaterial::new(vec![3u8; 32], BTreeMap::from([(1, [4u8; 32])]), 1).unwrap();
        if let Some(key) = admin_key {
            keys = keys.with_admin_api_key(key.to_string()).unwrap();
        }
        let config = SecurityConfig {
            credentials: CredentialConfig {
                algorithm_version: 1,
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            },
            ..SecurityConfig::default()
        };
        let core = SecurityCore::build(
            config,
            &keys,
            Arc::new(MemoryAuditStore::new()),
            Arc::new(clock.clone()),
        )
        .unwrap();
        (core, clock)
    }

    #[test]
    fn test_admin_key_check() {
        let (core, _) = build_core(Some("operator-key-0123456789"));
        assert!(core.admin_key_matches("operator-key-0123456789"));
        assert!(!core.admin_key_matches("operator-key-0123456788"));
        assert!(!core.admin_key_matches(""));

        let (core, _) = build_core(None);
        assert!(!core.admin_key_matches(""));
    }

    #[test]
    fn test_maintenance_purges_expired_state() {
        let (core, clock) = build_core(None);
        core.limiter.check("10.0.0.1", RouteClass::Login);
        core.limiter.check("10.0.0.2", RouteClass::General);
        assert_eq!(core.limiter.tracked_buckets(), 2);

        clock.advance_secs(61);
        let report = core.run_maintenance();
        assert_eq!(report.buckets_purged, 2);
        assert_eq!(core.limiter.tracked_buckets(), 0);
    }
}
