//! Metrics collection and exposition.
//!
//! # Metrics
//! - `security_auth_attempts_total` (counter): by flow, outcome
//! - `security_rate_limited_total` (counter): denials by route class
//! - `security_audit_records_total` (counter): appended audit records
//! - `security_audit_chain_breaks_total` (counter): failed verifications
//! - `security_decrypt_failures_total` (counter): failed field decryptions
//! - `security_revoked_tokens` (gauge): revocation set size
//! - `security_rate_buckets` (gauge): live rate-limit buckets
//!
//! Labels never carry tenant, user or client identifiers.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics exporter"),
    }
}

pub fn record_auth_attempt(flow: &'static str, outcome: &'static str) {
    ::metrics::counter!("security_auth_attempts_total", "flow" => flow, "outcome" => outcome).increment(1);
}

pub fn record_rate_limited(route_class: &'static str) {
    ::metrics::counter!("security_rate_limited_total", "route_class" => route_class).increment(1);
}

pub fn record_audit_record() {
    ::metrics::counter!("security_audit_records_total").increment(1);
}

pub fn record_chain_break() {
    ::metrics::counter!("security_audit_chain_breaks_total").increment(1);
}

pub fn record_decrypt_failure() {
    ::metrics::counter!("security_decrypt_failures_total").increment(1);
}

pub fn record_revoked_tokens(count: usize) {
    ::metrics::gauge!("security_revoked_tokens").set(count as f64);
}

pub fn record_rate_buckets(count: usize) {
    ::metrics::gauge!("security_rate_buckets").set(count as f64);
}
