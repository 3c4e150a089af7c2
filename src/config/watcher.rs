//! Configuration file watcher for hot reload.
//!
//! Only rate-limit policies are applied live. Token, credential, listener and
//! audit sections are read once at startup; changes to them are reported and
//! take effect on restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::loader::load_config;
use crate::config::schema::SecurityConfig;
use crate::security::rate_limit::RateLimiter;

/// What a reload changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReloadOutcome {
    /// Rate-limit policies were swapped in.
    pub rate_limits_applied: bool,
    /// Sections that changed on disk but need a restart.
    pub restart_required: Vec<&'static str>,
}

/// Apply the live-reloadable parts of `next` and report the rest.
pub fn apply_reload(current: &SecurityConfig, next: &SecurityConfig, limiter: &RateLimiter) -> ReloadOutcome {
    let mut outcome = ReloadOutcome::default();

    if current.rate_limit != next.rate_limit {
        limiter.update_policies(&next.rate_limit);
        outcome.rate_limits_applied = true;
    }

    if current.credentials != next.credentials {
        outcome.restart_required.push("credentials");
    }
    if current.tokens.issuer != next.tokens.issuer
        || current.tokens.access_ttl_secs != next.tokens.access_ttl_secs
        || current.tokens.refresh_ttl_secs != next.tokens.refresh_ttl_secs
    {
        outcome.restart_required.push("tokens");
    }
    if current.listener.bind_address != next.listener.bind_address {
        outcome.restart_required.push("listener");
    }
    if current.audit.directory != next.audit.directory || current.audit.store != next.audit.store {
        outcome.restart_required.push("audit");
    }

    outcome
}

/// Watches the configuration file and applies reloads to the rate limiter.
pub struct ConfigWatcher {
    path: PathBuf,
    current: SecurityConfig,
    limiter: Arc<RateLimiter>,
}

impl ConfigWatcher {
    pub fn new(path: &Path, current: SecurityConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            path: path.to_path_buf(),
            current,
            limiter,
        }
    }

    /// Start watching in notify's background thread.
    ///
    /// The returned watcher must be kept alive for as long as reloads are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let ConfigWatcher {
            path,
            mut current,
            limiter,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match load_config(&path) {
                        Ok(next) => {
                            let outcome = apply_reload(&current, &next, &limiter);
                            tracing::info!(
                                rate_limits_applied = outcome.rate_limits_applied,
                                restart_required = ?outcome.restart_required,
                                "Configuration reloaded"
                            );
                            current = next;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Rejected configuration reload, keeping current settings");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}
