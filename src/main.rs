//! Compliance security service.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!   Client request        │  request id → trace → timeout → limits       │
//!   ──────────────────────┼─▶ rate limiter (general, per address)        │
//!                         │      │                                       │
//!                         │      ▼                                       │
//!                         │  /auth/*  ──▶ auth service                   │
//!                         │                ├─ validator                  │
//!                         │                ├─ credentials (Argon2id)     │
//!                         │                ├─ tokens (HS256)             │
//!                         │                └─ audit logger ──▶ store     │
//!                         │  /admin/* ──▶ admin key ──▶ status / chains  │
//!                         │                                              │
//!                         │  cipher service: field encryption at rest    │
//!                         │  maintenance: purge buckets + revocations    │
//!                         └──────────────────────────────────────────────┘
//! ```
//!
//! Usage: `compliance-security [config.toml]`. Secrets come from the
//! environment (`CSEC_SIGNING_SECRET`, `CSEC_CIPHER_KEYS`,
//! `CSEC_CIPHER_ACTIVE_VERSION`, `CSEC_ADMIN_API_KEY`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use compliance_security::clock;
use compliance_security::config::loader::load_config;
use compliance_security::config::watcher::ConfigWatcher;
use compliance_security::config::{KeyMaterial, SecurityConfig};
use compliance_security::lifecycle::spawn_maintenance;
use compliance_security::observability::{logging, metrics};
use compliance_security::{HttpServer, SecurityCore, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => SecurityConfig::default(),
    };

    logging::init_tracing(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "compliance-security starting");

    // Missing or malformed key material is fatal: nothing is served without it.
    let keys = match KeyMaterial::from_env() {
        Ok(keys) => keys,
        Err(e) => {
            tracing::error!(error = %e, "Key material unavailable");
            return Err(e.into());
        }
    };

    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        audit_store = ?config.audit.store,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let store = SecurityCore::open_store(&config.audit)?;
    let core = Arc::new(SecurityCore::build(config.clone(), &keys, store, clock::system())?);
    drop(keys);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let _watcher = match &config_path {
        Some(path) => match ConfigWatcher::new(path, config.clone(), core.limiter.clone()).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher unavailable, reload disabled");
                None
            }
        },
        None => None,
    };

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown.clone().trigger_on_ctrl_c());

    let maintenance = spawn_maintenance(
        core.clone(),
        Duration::from_secs(config.rate_limit.cleanup_interval_secs),
        &shutdown,
    );

    let server = HttpServer::new(core);
    match &config.listener.tls {
        Some(tls) => {
            let addr: SocketAddr = config.listener.bind_address.parse()?;
            server.run_tls(addr, tls, shutdown.clone()).await?;
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            server.run(listener, shutdown.clone()).await?;
        }
    }

    shutdown.trigger();
    let _ = maintenance.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
