//! Sliding-window rate limiting per identity and route class.
//!
//! # Design Decisions
//! - One bucket per `(identity_key, route_class)`; route classes have independent budgets
//! - Sliding window: at most `limit` requests in any span of `window_secs`
//! - Buckets live in a sharded map, so unrelated identities never contend on one lock
//! - Policies come from configuration and can be swapped at runtime
//! - Expired buckets are dropped by `purge_expired`, driven by the maintenance task

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::{RateLimitConfig, WindowPolicy};
use crate::error::AuthFailure;
use crate::observability::metrics;

/// Class of operation a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteClass {
    Login,
    PasswordReset,
    TokenRefresh,
    General,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Login => "login",
            RouteClass::PasswordReset => "password_reset",
            RouteClass::TokenRefresh => "token_refresh",
            RouteClass::General => "general",
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { retry_after: Duration },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Map a denial onto the auth failure callers return.
    pub fn into_result(self) -> Result<(), AuthFailure> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny { retry_after } => Err(AuthFailure::RateLimited { retry_after }),
        }
    }
}

/// Timestamps of the requests admitted during the trailing window.
///
/// Holds at most `limit` entries, oldest first.
#[derive(Debug, Default)]
struct RateBucket {
    admitted: VecDeque<u64>,
}

impl RateBucket {
    fn try_acquire(&mut self, now_ms: u64, policy: &WindowPolicy) -> Decision {
        let window_ms = policy.window_ms();
        self.evict(now_ms, window_ms);

        if self.admitted.len() < policy.limit as usize {
            self.admitted.push_back(now_ms);
            return Decision::Allow;
        }

        // The slot frees up when the oldest admitted request leaves the window.
        let frees_at = self
            .admitted
            .front()
            .map_or(now_ms, |oldest| oldest.saturating_add(window_ms));
        Decision::Deny {
            retry_after: Duration::from_millis(frees_at.saturating_sub(now_ms).min(window_ms)),
        }
    }

    fn evict(&mut self, now_ms: u64, window_ms: u64) {
        while let Some(&oldest) = self.admitted.front() {
            if oldest.saturating_add(window_ms) > now_ms {
                break;
            }
            self.admitted.pop_front();
        }
    }

    fn expired(&self, now_ms: u64, policy: &WindowPolicy) -> bool {
        self.admitted
            .back()
            .map_or(true, |newest| newest.saturating_add(policy.window_ms()) <= now_ms)
    }
}

/// Budgets per route class.
#[derive(Debug, Clone)]
struct Policies {
    enabled: bool,
    login: WindowPolicy,
    password_reset: WindowPolicy,
    token_refresh: WindowPolicy,
    general: WindowPolicy,
}

impl Policies {
    fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            login: config.login,
            password_reset: config.password_reset,
            token_refresh: config.token_refresh,
            general: config.general,
        }
    }

    fn for_class(&self, class: RouteClass) -> &WindowPolicy {
        match class {
            RouteClass::Login => &self.login,
            RouteClass::PasswordReset => &self.password_reset,
            RouteClass::TokenRefresh => &self.token_refresh,
            RouteClass::General => &self.general,
        }
    }
}

/// Per-identity, per-route request throttle.
pub struct RateLimiter {
    buckets: DashMap<(String, RouteClass), RateBucket>,
    policies: ArcSwap<Policies>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            policies: ArcSwap::from_pointee(Policies::from_config(config)),
            clock,
        }
    }

    /// Count a request and decide whether it may proceed.
    pub fn check(&self, identity_key: &str, route_class: RouteClass) -> Decision {
        let policies = self.policies.load();
        if !policies.enabled {
            return Decision::Allow;
        }
        let policy = policies.for_class(route_class);
        let now = self.clock.now_millis();

        let decision = self
            .buckets
            .entry((identity_key.to_string(), route_class))
            .or_default()
            .try_acquire(now, policy);

        if let Decision::Deny { retry_after } = decision {
            tracing::warn!(
                identity = %identity_key,
                route_class = route_class.as_str(),
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(route_class.as_str());
        }
        decision
    }

    /// Swap in new budgets; requests already admitted keep counting.
    pub fn update_policies(&self, config: &RateLimitConfig) {
        self.policies.store(Arc::new(Policies::from_config(config)));
        tracing::info!(
            login_limit = config.login.limit,
            general_limit = config.general.limit,
            "Rate limit policies updated"
        );
    }

    /// Drop every bucket whose window has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let policies = self.policies.load();
        let now = self.clock.now_millis();
        let before = self.buckets.len();
        self.buckets
            .retain(|(_, class), bucket| !bucket.expired(now, policies.for_class(*class)));
        let remaining = self.buckets.len();
        metrics::record_rate_buckets(remaining);
        before.saturating_sub(remaining)
    }

    /// Number of live buckets.
    pub fn tracked_buckets(&self) -> usize {
        self.buckets.len()
    }
}

/// Middleware applying the general budget per client address.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = addr.ip().to_string();

    match limiter.check(&key, RouteClass::General) {
        Decision::Allow => next.run(request).await,
        Decision::Deny { retry_after } => too_many_requests(retry_after),
    }
}

/// 429 response carrying a `Retry-After` header in whole seconds.
pub fn too_many_requests(retry_after: Duration) -> Response {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    let mut response = Response::new(Body::from("Rate limit exceeded"));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter_with(limit: u32, window_secs: u64) -> (RateLimiter, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let mut config = RateLimitConfig::default();
        config.login = WindowPolicy { limit, window_secs };
        (RateLimiter::new(&config, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_denies_after_limit_within_window() {
        let (limiter, clock) = limiter_with(3, 60);

        for _ in 0..3 {
            assert!(limiter.check("198.51.100.7", RouteClass::Login).is_allowed());
        }

        clock.advance_secs(20);
        match limiter.check("198.51.100.7", RouteClass::Login) {
            Decision::Deny { retry_after } => {
                assert!(retry_after <= Duration::from_secs(40));
                assert!(retry_after > Duration::ZERO);
            }
            Decision::Allow => panic!("fourth request must be denied"),
        }
    }

    #[test]
    fn test_allows_again_after_window() {
        let (limiter, clock) = limiter_with(2, 10);

        assert!(limiter.check("acct:alice", RouteClass::Login).is_allowed());
        assert!(limiter.check("acct:alice", RouteClass::Login).is_allowed());
        assert!(!limiter.check("acct:alice", RouteClass::Login).is_allowed());

        clock.advance_secs(10);
        assert!(limiter.check("acct:alice", RouteClass::Login).is_allowed());
    }

    #[test]
    fn test_no_burst_across_window_boundary() {
        let (limiter, clock) = limiter_with(5, 60);

        assert!(limiter.check("203.0.113.9", RouteClass::Login).is_allowed());
        clock.advance_millis(59_900);
        for _ in 0..4 {
            assert!(limiter.check("203.0.113.9", RouteClass::Login).is_allowed());
        }

        // The first request has left the window, the other four have not.
        clock.advance_millis(100);
        assert!(limiter.check("203.0.113.9", RouteClass::Login).is_allowed());
        match limiter.check("203.0.113.9", RouteClass::Login) {
            Decision::Deny { retry_after } => {
                assert_eq!(retry_after, Duration::from_millis(59_900));
            }
            Decision::Allow => panic!("sixth request within 60s must be denied"),
        }

        let mut admitted = 0;
        for _ in 0..5 {
            if limiter.check("203.0.113.9", RouteClass::Login).is_allowed() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 0);
    }

    #[test]
    fn test_retry_after_never_exceeds_window() {
        let (limiter, clock) = limiter_with(2, 30);
        limiter.check("k", RouteClass::Login);
        clock.advance_secs(5);
        limiter.check("k", RouteClass::Login);

        match limiter.check("k", RouteClass::Login) {
            Decision::Deny { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(25));
            }
            Decision::Allow => panic!("third request must be denied"),
        }

        clock.advance_secs(25);
        assert!(limiter.check("k", RouteClass::Login).is_allowed());
        assert!(!limiter.check("k", RouteClass::Login).is_allowed());
    }

    #[test]
    fn test_huge_window_does_not_overflow() {
        let (limiter, clock) = limiter_with(1, u64::MAX);
        assert!(limiter.check("k", RouteClass::Login).is_allowed());
        clock.advance_secs(1_000_000);
        assert!(!limiter.check("k", RouteClass::Login).is_allowed());
        assert_eq!(limiter.purge_expired(), 0);
    }

    #[test]
    fn test_classes_and_identities_are_independent() {
        let (limiter, _clock) = limiter_with(1, 60);

        assert!(limiter.check("10.1.1.1", RouteClass::Login).is_allowed());
        assert!(!limiter.check("10.1.1.1", RouteClass::Login).is_allowed());

        // Other identity, same class.
        assert!(limiter.check("10.1.1.2", RouteClass::Login).is_allowed());
        // Same identity, other class.
        assert!(limiter.check("10.1.1.1", RouteClass::General).is_allowed());
    }

    #[test]
    fn test_purge_drops_expired_buckets() {
        let (limiter, clock) = limiter_with(5, 60);
        limiter.check("a", RouteClass::Login);
        limiter.check("b", RouteClass::Login);
        assert_eq!(limiter.tracked_buckets(), 2);

        clock.advance_secs(30);
        assert_eq!(limiter.purge_expired(), 0);

        clock.advance_secs(30);
        assert_eq!(limiter.purge_expired(), 2);
        assert_eq!(limiter.tracked_buckets(), 0);
    }

    #[test]
    fn test_disabled_limiter_allows_everything() {
        let mut config = RateLimitConfig::default();
        config.enabled = false;
        config.login.limit = 1;
        let limiter = RateLimiter::new(&config, Arc::new(ManualClock::new(0)));
        for _ in 0..10 {
            assert!(limiter.check("x", RouteClass::Login).is_allowed());
        }
        assert_eq!(limiter.tracked_buckets(), 0);
    }

    #[test]
    fn test_deny_maps_to_auth_failure() {
        let decision = Decision::Deny {
            retry_after: Duration::from_secs(3),
        };
        assert_eq!(
            decision.into_result(),
            Err(AuthFailure::RateLimited {
                retry_after: Duration::from_secs(3)
            })
        );
    }

    #[test]
    fn test_retry_after_header_rounds_up() {
        let response = too_many_requests(Duration::from_millis(1500));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }
}
