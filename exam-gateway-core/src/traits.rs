use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{SecurityEvent, WindowKey};
use crate::error::Result;

/// Persistence for fixed-window request counters.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically insert the key with count 1, or increment it on conflict,
    /// returning the post-increment count.
    ///
    /// Backends without such a primitive return `CoreError::Unsupported`.
    async fn upsert_increment(&self, key: &WindowKey) -> Result<i64>;

    /// Current count for the key, if a record exists.
    async fn fetch_count(&self, key: &WindowKey) -> Result<Option<i64>>;

    /// Write an absolute count, creating the record when missing.
    async fn store_count(&self, key: &WindowKey, count: i64) -> Result<()>;

    /// Delete records whose window started before `cutoff`; returns how many.
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Append-only destination for security events.
#[async_trait]
pub trait SecurityEventSink: Send + Sync {
    async fn append(&self, event: &SecurityEvent) -> Result<()>;
}
