//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router for the authentication and operator endpoints
//! - Wire up middleware (request ID, tracing, timeout, limits, rate limiting)
//! - Serve plain TCP or TLS until the shutdown signal fires

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::bootstrap::SecurityCore;
use crate::config::schema::TlsConfig;
use crate::http::handlers;
use crate::http::middleware::require_session;
use crate::lifecycle::Shutdown;
use crate::security::rate_limit::rate_limit_middleware;

/// Time allowed for in-flight TLS connections to finish after shutdown.
const TLS_DRAIN_SECS: u64 = 10;

pub struct HttpServer {
    router: Router,
    core: Arc<SecurityCore>,
}

impl HttpServer {
    pub fn new(core: Arc<SecurityCore>) -> Self {
        let router = build_router(core.clone());
        Self { router, core }
    }

    /// Serve on an already bound listener until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve TLS on `addr` until `shutdown` fires.
    pub async fn run_tls(self, addr: SocketAddr, tls: &TlsConfig, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
        let handle = axum_server::Handle::new();

        let drain = handle.clone();
        tokio::spawn(async move {
            shutdown.wait().await;
            drain.graceful_shutdown(Some(Duration::from_secs(TLS_DRAIN_SECS)));
        });

        tracing::info!(address = %addr, "HTTPS server starting");
        axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    pub fn core(&self) -> &Arc<SecurityCore> {
        &self.core
    }
}

/// Build the router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(core: Arc<SecurityCore>) -> Router {
    let listener = &core.config.listener;

    let session_routes = Router::new()
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/password", post(handlers::change_password))
        .route("/auth/session", get(handlers::session))
        .route_layer(middleware::from_fn_with_state(core.clone(), require_session));

    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh))
        .merge(session_routes);

    if core.config.admin.enabled {
        app = app.merge(admin::router(core.clone()));
    }

    app.with_state(core.clone())
        .layer(middleware::from_fn_with_state(core.limiter.clone(), rate_limit_middleware))
        .layer(ConcurrencyLimitLayer::new(listener.max_concurrent_requests))
        .layer(RequestBodyLimitLayer::new(listener.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(core.config.timeouts.request_secs)))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, std::io::Error> {
    for (kind, path) in [("Certificate", cert_path), ("Private key", key_path)] {
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} file not found: {}", kind, path.display()),
            ));
        }
    }
    RustlsConfig::from_pem_file(cert_path, key_path).await
}
