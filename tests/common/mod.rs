//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use dashmap::DashMap;
use serde_json::Value;

use compliance_security::audit::{AuditRecord, AuditStore};
use compliance_security::clock::ManualClock;
use compliance_security::config::{AuditStoreKind, CredentialConfig, KeyMaterial, SecurityConfig};
use compliance_security::error::StorageError;
use compliance_security::principal::TenantId;
use compliance_security::http::build_router;
use compliance_security::SecurityCore;

pub const START_MS: u64 = 1_700_000_000_000;
pub const ADMIN_KEY: &str = "operator-key-for-tests";

pub fn key_material() -> KeyMaterial {
    KeyMaterial::new(vec![42u8; 32], BTreeMap::from([(1, [7u8; 32])]), 1)
        .unwrap()
        .with_admin_api_key(ADMIN_KEY.to_string())
        .unwrap()
}

/// Defaults with a cheap Argon2 profile and an in-memory audit store.
pub fn test_config() -> SecurityConfig {
    let mut config = SecurityConfig::default();
    config.credentials = CredentialConfig {
        algorithm_version: 1,
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    };
    config.audit.store = AuditStoreKind::Memory;
    config.observability.metrics_enabled = false;
    config
}

/// In-memory audit store whose records tests may rewrite behind the logger's back.
#[derive(Default)]
pub struct TamperableStore {
    chains: DashMap<TenantId, Vec<AuditRecord>>,
}

impl TamperableStore {
    pub fn tamper<F>(&self, tenant_id: TenantId, f: F)
    where
        F: FnOnce(&mut Vec<AuditRecord>),
    {
        f(self.chains.entry(tenant_id).or_default().value_mut());
    }
}

impl AuditStore for TamperableStore {
    fn append(&self, record: &AuditRecord) -> Result<(), StorageError> {
        self.chains.entry(record.tenant_id).or_default().push(record.clone());
        Ok(())
    }

    fn scan(&self, tenant_id: TenantId) -> Result<Vec<AuditRecord>, StorageError> {
        Ok(self.chains.get(&tenant_id).map(|c| c.value().clone()).unwrap_or_default())
    }

    fn tenants(&self) -> Result<Vec<TenantId>, StorageError> {
        let mut tenants: Vec<TenantId> = self
            .chains
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| *entry.key())
            .collect();
        tenants.sort();
        Ok(tenants)
    }
}

pub struct TestCore {
    pub core: Arc<SecurityCore>,
    pub clock: ManualClock,
    pub store: Arc<TamperableStore>,
}

pub fn build_core(config: SecurityConfig) -> TestCore {
    let clock = ManualClock::new(START_MS);
    let store = Arc::new(TamperableStore::default());
    let shared: Arc<dyn AuditStore> = store.clone();
    let core = SecurityCore::build(config, &key_material(), shared, Arc::new(clock.clone())).unwrap();
    TestCore {
        core: Arc::new(core),
        clock,
        store,
    }
}

/// Router whose requests all appear to come from `client`.
pub fn router_from(core: Arc<SecurityCore>, client: &str) -> Router {
    let addr: SocketAddr = client.parse().unwrap();
    build_router(core).layer(MockConnectInfo(addr))
}

pub fn json_request(method: Method, uri: &str, body: Option<Value>, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn read_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}
