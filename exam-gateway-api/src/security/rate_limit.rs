//! Fixed-window rate limiting
//!
//! Requests are counted per `(identifier, endpoint, window_start)` with
//! windows aligned to multiples of the policy length since the epoch. A burst
//! straddling a window boundary can therefore see up to twice the policy
//! maximum in one window's worth of time.
//!
//! The limiter fails open: when the counter store cannot be consulted the
//! request is allowed and a warning is logged.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use exam_gateway_core::{
    Clock, CoreError, FixedWindow, PolicyTable, RateLimitDecision, RateLimitStore,
    Result as CoreResult, SecurityEventKind, SystemClock, WindowKey,
};
use serde_json::json;
use tracing::{debug, warn};

use super::gateway::SecurityGateway;
use super::origin::request_context;
use crate::observability::metrics::SecurityMetrics;

/// Rate limit error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum RateLimitError {
    #[error("Too many requests. Retry after {retry_after}s")]
    TooManyRequests {
        limit: u32,
        reset_at: DateTime<Utc>,
        retry_after: u64,
    },
}

impl RateLimitError {
    /// The rejection for a denied decision; `None` when the request is allowed.
    pub fn from_decision(decision: &RateLimitDecision) -> Option<Self> {
        (!decision.allowed).then(|| RateLimitError::TooManyRequests {
            limit: decision.limit,
            reset_at: decision.reset_at,
            retry_after: decision.retry_after.unwrap_or(0),
        })
    }
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        match self {
            RateLimitError::TooManyRequests {
                limit,
                reset_at,
                retry_after,
            } => {
                let mut headers = HeaderMap::new();
                headers.insert("Retry-After", HeaderValue::from(retry_after));
                headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
                headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u32));
                headers.insert("X-RateLimit-Reset", HeaderValue::from(reset_at.timestamp()));

                let body = Json(json!({
                    "error": "Too many requests",
                    "retryAfter": retry_after,
                    "resetAt": reset_at.to_rfc3339(),
                }));

                (StatusCode::TOO_MANY_REQUESTS, headers, body).into_response()
            }
        }
    }
}

/// Counts requests against the policy table using a shared counter store.
pub struct FixedWindowRateLimiter {
    store: Arc<dyn RateLimitStore>,
    policies: Arc<PolicyTable>,
    clock: Arc<dyn Clock>,
}

impl FixedWindowRateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, policies: PolicyTable) -> Self {
        Self {
            store,
            policies: Arc::new(policies),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Count one request for `identifier` on `endpoint` and decide whether it
    /// may proceed. Never fails: store errors produce an allowing decision.
    pub async fn check(&self, identifier: &str, endpoint: &str) -> RateLimitDecision {
        let policy = self.policies.lookup(endpoint);
        let now = self.clock.now();
        let window = FixedWindow::containing(now, policy.window_ms);
        let key = WindowKey::new(identifier, endpoint, window.start);

        let decision = match self.increment(&key).await {
            Ok(count) => RateLimitDecision::from_count(count, policy, window, now),
            Err(err) => {
                SecurityMetrics::record_rate_limit_store_failure();
                warn!(
                    error = %err,
                    identifier = %identifier,
                    endpoint = %endpoint,
                    "Rate limit store unavailable, allowing request"
                );
                RateLimitDecision::fail_open(policy, window)
            }
        };

        SecurityMetrics::record_rate_limit_check(endpoint, decision.allowed);
        decision
    }

    async fn increment(&self, key: &WindowKey) -> CoreResult<i64> {
        match self.store.upsert_increment(key).await {
            Err(CoreError::Unsupported(reason)) => {
                debug!(reason = %reason, "Atomic increment unsupported, using read-then-write");

                // Not atomic: two requests in the same window can read the same
                // count and both store count + 1. The window then undercounts;
                // it never overcounts and never leaks into another window.
                let count = self.store.fetch_count(key).await?.unwrap_or(0) + 1;
                self.store.store_count(key, count).await?;
                Ok(count)
            }
            result => result,
        }
    }

    /// Delete counters for windows that started more than `older_than` ago.
    pub async fn prune_expired(&self, older_than: Duration) -> CoreResult<u64> {
        let cutoff = self.clock.now() - older_than;
        self.store.prune_before(cutoff).await
    }
}

/// Add rate limit headers to a response
pub fn add_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "X-RateLimit-Reset",
        HeaderValue::from(decision.reset_at.timestamp()),
    );
}

/// Axum middleware function for rate limiting
pub async fn rate_limit_middleware(
    State(gateway): State<SecurityGateway>,
    req: Request,
    next: Next,
) -> Response {
    let ctx = request_context(&req);
    let decision = gateway
        .limiter
        .check(&ctx.rate_limit_identifier(), &ctx.endpoint)
        .await;

    if let Some(err) = RateLimitError::from_decision(&decision) {
        let RateLimitError::TooManyRequests {
            limit, retry_after, ..
        } = err;
        gateway.events.record(
            SecurityEventKind::RateLimitExceeded { limit, retry_after },
            &ctx,
            Some(StatusCode::TOO_MANY_REQUESTS.as_u16()),
        );
        return err.into_response();
    }

    let mut response = next.run(req).await;
    add_rate_limit_headers(response.headers_mut(), &decision);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_gateway_core::{EndpointPolicy, ManualClock};
    use exam_gateway_storage::InMemoryRateLimitStore;

    // A multiple of every standard window length
    const ALIGNED_MS: i64 = 1_620_000_000_000;

    fn limiter(store: Arc<InMemoryRateLimitStore>, clock: Arc<ManualClock>) -> FixedWindowRateLimiter {
        FixedWindowRateLimiter::new(store, PolicyTable::standard()).with_clock(clock)
    }

    #[tokio::test]
    async fn test_login_allows_ten_then_denies() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let clock = Arc::new(ManualClock::at_millis(ALIGNED_MS + 10_000));
        let limiter = limiter(store, clock);

        for expected_remaining in (0..10).rev() {
            let decision = limiter.check("ip:203.0.113.5", "auth/login").await;
            assert!(decision.allowed);
            assert_eq!(decision.limit, 10);
            assert_eq!(decision.remaining, expected_remaining);
            assert_eq!(decision.retry_after, None);
        }

        let denied = limiter.check("ip:203.0.113.5", "auth/login").await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after, Some(290));
        assert_eq!(denied.reset_at.timestamp_millis(), ALIGNED_MS + 300_000);
    }

    #[tokio::test]
    async fn test_next_window_starts_fresh() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let clock = Arc::new(ManualClock::at_millis(ALIGNED_MS + 59_000));
        let limiter = FixedWindowRateLimiter::new(
            store.clone(),
            PolicyTable::with_default(EndpointPolicy::new(60_000, 2)),
        )
        .with_clock(clock.clone());

        assert!(limiter.check("user:u-1", "feedback").await.allowed);
        assert!(limiter.check("user:u-1", "feedback").await.allowed);
        assert!(!limiter.check("user:u-1", "feedback").await.allowed);

        clock.advance(Duration::seconds(1));
        let decision = limiter.check("user:u-1", "feedback").await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);

        // The old window keeps its record; the new one gets its own
        assert_eq!(store.records().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_endpoint_uses_default_policy() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let clock = Arc::new(ManualClock::at_millis(ALIGNED_MS));
        let limiter = limiter(store, clock);

        let decision = limiter.check("ip:unknown", "reports/export").await;
        assert_eq!(decision.limit, 100);
        assert_eq!(decision.remaining, 99);
    }

    #[tokio::test]
    async fn test_store_outage_fails_open() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        store.set_available(false);
        let clock = Arc::new(ManualClock::at_millis(ALIGNED_MS + 1_000));
        let limiter = limiter(store, clock);

        for _ in 0..20 {
            let decision = limiter.check("ip:203.0.113.5", "auth/login").await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, 10);
            assert_eq!(decision.retry_after, None);
        }
    }

    #[tokio::test]
    async fn test_read_then_write_fallback_counts_sequential_requests() {
        let store = Arc::new(InMemoryRateLimitStore::without_atomic_upsert());
        let clock = Arc::new(ManualClock::at_millis(ALIGNED_MS));
        let limiter = limiter(store.clone(), clock);

        for _ in 0..3 {
            assert!(limiter.check("ip:198.51.100.7", "auth/reset-password").await.allowed);
        }
        let denied = limiter.check("ip:198.51.100.7", "auth/reset-password").await;
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(3600));

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].request_count, 4);
    }

    #[tokio::test]
    async fn test_prune_expired_removes_old_windows() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let clock = Arc::new(ManualClock::at_millis(ALIGNED_MS));
        let limiter = limiter(store.clone(), clock.clone());

        limiter.check("ip:a", "feedback").await;
        clock.advance(Duration::hours(25));
        limiter.check("ip:a", "feedback").await;

        let pruned = limiter.prune_expired(Duration::hours(24)).await.unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn test_rate_limit_error_response() {
        let reset_at = DateTime::from_timestamp(1_500_000_300, 0).unwrap();
        let response = RateLimitError::TooManyRequests {
            limit: 10,
            reset_at,
            retry_after: 42,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["Retry-After"], "42");
        assert_eq!(response.headers()["X-RateLimit-Limit"], "10");
        assert_eq!(response.headers()["X-RateLimit-Remaining"], "0");
        assert_eq!(response.headers()["X-RateLimit-Reset"], "1500000300");
    }

    #[test]
    fn test_allowed_decision_has_no_error() {
        let decision = RateLimitDecision {
            allowed: true,
            limit: 5,
            remaining: 4,
            reset_at: Utc::now(),
            retry_after: None,
        };
        assert!(RateLimitError::from_decision(&decision).is_none());

        let mut headers = HeaderMap::new();
        add_rate_limit_headers(&mut headers, &decision);
        assert_eq!(headers["X-RateLimit-Remaining"], "4");
    }
}
