use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::policy::EndpointPolicy;

/// A fixed window aligned to a multiple of its length since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    pub start: DateTime<Utc>,
    pub reset_at: DateTime<Utc>,
}

impl FixedWindow {
    /// The window of length `window_ms` that contains `now`.
    ///
    /// `start = floor(now / window_ms) * window_ms`, `reset_at = start + window_ms`.
    /// Both ends saturate at the representable date range.
    pub fn containing(now: DateTime<Utc>, window_ms: u64) -> Self {
        let window_ms = i64::try_from(window_ms.max(1)).unwrap_or(i64::MAX);
        let offset_ms = now.timestamp_millis().rem_euclid(window_ms);

        let start = now
            .checked_sub_signed(Duration::milliseconds(offset_ms))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self {
            start,
            reset_at: start
                .checked_add_signed(Duration::milliseconds(window_ms))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Whole seconds from `now` until the window resets, rounded up.
    pub fn seconds_until_reset(&self, now: DateTime<Utc>) -> u64 {
        let remaining_ms = (self.reset_at - now).num_milliseconds().max(0) as u64;
        remaining_ms.div_ceil(1000)
    }
}

/// Storage key of one counter: `(identifier, endpoint, window_start)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowKey {
    pub identifier: String,
    pub endpoint: String,
    pub window_start: DateTime<Utc>,
}

impl WindowKey {
    pub fn new(
        identifier: impl Into<String>,
        endpoint: impl Into<String>,
        window_start: DateTime<Utc>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            endpoint: endpoint.into(),
            window_start,
        }
    }
}

/// Persisted counter row.
///
/// A new window always creates a new record; the count of an existing record
/// only ever grows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub identifier: String,
    pub endpoint: String,
    pub window_start: DateTime<Utc>,
    pub request_count: i64,
}

/// Outcome of one rate limit check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Policy maximum for the window
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Seconds until `reset_at`; only present when denied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl RateLimitDecision {
    /// Decision for the `count`-th request of `window` under `policy`.
    pub fn from_count(
        count: i64,
        policy: EndpointPolicy,
        window: FixedWindow,
        now: DateTime<Utc>,
    ) -> Self {
        let max = i64::from(policy.max_requests);
        let allowed = count <= max;

        Self {
            allowed,
            limit: policy.max_requests,
            remaining: (max - count).clamp(0, max) as u32,
            reset_at: window.reset_at,
            retry_after: (!allowed).then(|| window.seconds_until_reset(now)),
        }
    }

    /// Decision returned when the counter store could not be consulted.
    pub fn fail_open(policy: EndpointPolicy, window: FixedWindow) -> Self {
        Self {
            allowed: true,
            limit: policy.max_requests,
            remaining: policy.max_requests,
            reset_at: window.reset_at,
            retry_after: None,
        }
    }
}
