//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (TTLs and windows within bounds, cost floors)
//! - Check relationships (refresh outlives access)
//!
//! # Design Decisions
//! - Returns all validation issues, not just the first
//! - Validation is a pure function: SecurityConfig → Result<(), Vec<ConfigIssue>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{SecurityConfig, WindowPolicy};

/// Smallest Argon2 memory cost the core accepts, in KiB.
pub const MIN_MEMORY_KIB: u32 = 8;

pub const MAX_ACCESS_TTL_SECS: u64 = 24 * 60 * 60;
pub const MAX_REFRESH_TTL_SECS: u64 = 365 * 24 * 60 * 60;
pub const MAX_WINDOW_SECS: u64 = 24 * 60 * 60;
/// Each admitted request in a window is remembered, so the budget is bounded.
pub const MAX_WINDOW_LIMIT: u32 = 100_000;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &SecurityConfig) -> Result<(), Vec<ConfigIssue>> {
    let mut issues = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        issues.push(ConfigIssue::new(
            "listener.bind_address",
            "not a socket address",
        ));
    }
    if config.listener.max_concurrent_requests == 0 {
        issues.push(ConfigIssue::new(
            "listener.max_concurrent_requests",
            "must be greater than zero",
        ));
    }
    if config.timeouts.request_secs == 0 {
        issues.push(ConfigIssue::new("timeouts.request_secs", "must be greater than zero"));
    }

    let tokens = &config.tokens;
    if tokens.issuer.trim().is_empty() {
        issues.push(ConfigIssue::new("tokens.issuer", "must not be empty"));
    }
    if tokens.access_ttl_secs == 0 {
        issues.push(ConfigIssue::new("tokens.access_ttl_secs", "must be greater than zero"));
    }
    if tokens.access_ttl_secs > MAX_ACCESS_TTL_SECS {
        issues.push(ConfigIssue::new(
            "tokens.access_ttl_secs",
            format!("must be at most {} seconds", MAX_ACCESS_TTL_SECS),
        ));
    }
    if tokens.refresh_ttl_secs > MAX_REFRESH_TTL_SECS {
        issues.push(ConfigIssue::new(
            "tokens.refresh_ttl_secs",
            format!("must be at most {} seconds", MAX_REFRESH_TTL_SECS),
        ));
    }
    if tokens.refresh_ttl_secs <= tokens.access_ttl_secs {
        issues.push(ConfigIssue::new(
            "tokens.refresh_ttl_secs",
            "must be longer than the access token lifetime",
        ));
    }

    let creds = &config.credentials;
    if creds.algorithm_version == 0 {
        issues.push(ConfigIssue::new("credentials.algorithm_version", "must start at 1"));
    }
    if creds.parallelism == 0 {
        issues.push(ConfigIssue::new("credentials.parallelism", "must be greater than zero"));
    }
    if creds.iterations == 0 {
        issues.push(ConfigIssue::new("credentials.iterations", "must be greater than zero"));
    }
    if creds.memory_kib < MIN_MEMORY_KIB.saturating_mul(creds.parallelism.max(1)) {
        issues.push(ConfigIssue::new(
            "credentials.memory_kib",
            format!("must be at least {} KiB per lane", MIN_MEMORY_KIB),
        ));
    }

    let limits = &config.rate_limit;
    check_window(&mut issues, "rate_limit.login", &limits.login);
    check_window(&mut issues, "rate_limit.password_reset", &limits.password_reset);
    check_window(&mut issues, "rate_limit.token_refresh", &limits.token_refresh);
    check_window(&mut issues, "rate_limit.general", &limits.general);
    if limits.cleanup_interval_secs == 0 {
        issues.push(ConfigIssue::new(
            "rate_limit.cleanup_interval_secs",
            "must be greater than zero",
        ));
    }

    if config.audit.directory.trim().is_empty() {
        issues.push(ConfigIssue::new("audit.directory", "must not be empty"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        issues.push(ConfigIssue::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn check_window(issues: &mut Vec<ConfigIssue>, field: &str, policy: &WindowPolicy) {
    if policy.limit == 0 {
        issues.push(ConfigIssue::new(format!("{field}.limit"), "must be greater than zero"));
    } else if policy.limit > MAX_WINDOW_LIMIT {
        issues.push(ConfigIssue::new(
            format!("{field}.limit"),
            format!("must be at most {}", MAX_WINDOW_LIMIT),
        ));
    }
    if policy.window_secs == 0 {
        issues.push(ConfigIssue::new(
            format!("{field}.window_secs"),
            "must be greater than zero",
        ));
    } else if policy.window_secs > MAX_WINDOW_SECS {
        issues.push(ConfigIssue::new(
            format!("{field}.window_secs"),
            format!("must be at most {} seconds", MAX_WINDOW_SECS),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&SecurityConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_issue() {
        let mut config = SecurityConfig::default();
        config.tokens.refresh_ttl_secs = 10;
        config.tokens.access_ttl_secs = 60;
        config.rate_limit.login.limit = 0;
        config.listener.bind_address = "nowhere".into();

        let issues = validate_config(&config).unwrap_err();
        let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
        assert!(fields.contains(&"tokens.refresh_ttl_secs"));
        assert!(fields.contains(&"rate_limit.login.limit"));
        assert!(fields.contains(&"listener.bind_address"));
        assert_eq!(issues.len(), 3);
    }

    #[test]
    fn test_memory_floor_scales_with_lanes() {
        let mut config = SecurityConfig::default();
        config.credentials.parallelism = 4;
        config.credentials.memory_kib = 16;
        let issues = validate_config(&config).unwrap_err();
        assert_eq!(issues[0].field, "credentials.memory_kib");
    }

    #[test]
    fn test_rejects_oversized_windows_and_lifetimes() {
        let mut config = SecurityConfig::default();
        config.rate_limit.general.window_secs = u64::MAX;
        config.rate_limit.login.limit = u32::MAX;
        config.tokens.refresh_ttl_secs = u64::MAX;

        let issues = validate_config(&config).unwrap_err();
        let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
        assert!(fields.contains(&"rate_limit.general.window_secs"));
        assert!(fields.contains(&"rate_limit.login.limit"));
        assert!(fields.contains(&"tokens.refresh_ttl_secs"));
    }
}
