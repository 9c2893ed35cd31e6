//! In-process stores.
//!
//! Used when no database is configured and throughout the test suites. Both
//! can be switched into an unavailable state to exercise degraded behavior.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use exam_gateway_core::{
    CoreError, RateLimitRecord, RateLimitStore, Result, SecurityEvent, SecurityEventSink,
    WindowKey,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, RwLock};

/// Counter store backed by a concurrent map
#[derive(Debug)]
pub struct InMemoryRateLimitStore {
    counts: DashMap<WindowKey, i64>,
    atomic_upsert: bool,
    available: AtomicBool,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self {
            counts: DashMap::new(),
            atomic_upsert: true,
            available: AtomicBool::new(true),
        }
    }

    /// Store that reports the atomic upsert as unsupported, forcing callers
    /// onto the read-then-write path.
    pub fn without_atomic_upsert() -> Self {
        Self {
            atomic_upsert: false,
            ..Self::new()
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<RateLimitRecord> {
        self.counts
            .iter()
            .map(|entry| RateLimitRecord {
                identifier: entry.key().identifier.clone(),
                endpoint: entry.key().endpoint.clone(),
                window_start: entry.key().window_start,
                request_count: *entry.value(),
            })
            .collect()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::Unavailable("in-memory rate limit store offline".to_string()))
        }
    }
}

impl Default for InMemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn upsert_increment(&self, key: &WindowKey) -> Result<i64> {
        self.ensure_available()?;
        if !self.atomic_upsert {
            return Err(CoreError::Unsupported("atomic upsert disabled".to_string()));
        }

        let mut entry = self.counts.entry(key.clone()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn fetch_count(&self, key: &WindowKey) -> Result<Option<i64>> {
        self.ensure_available()?;
        Ok(self.counts.get(key).map(|count| *count))
    }

    async fn store_count(&self, key: &WindowKey, count: i64) -> Result<()> {
        self.ensure_available()?;
        self.counts.insert(key.clone(), count);
        Ok(())
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.ensure_available()?;
        let before = self.counts.len();
        self.counts.retain(|key, _| key.window_start >= cutoff);
        Ok((before - self.counts.len()) as u64)
    }
}

/// Event sink that keeps everything in memory
#[derive(Debug)]
pub struct InMemorySecurityEventStore {
    events: RwLock<Vec<SecurityEvent>>,
    appended: Notify,
    available: AtomicBool,
}

impl InMemorySecurityEventStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            appended: Notify::new(),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<SecurityEvent> {
        self.events.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Wait until at least `count` events were appended or `timeout` elapses.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.len().await >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.len().await >= count;
            }
        }
    }
}

impl Default for InMemorySecurityEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecurityEventSink for InMemorySecurityEventStore {
    async fn append(&self, event: &SecurityEvent) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CoreError::Unavailable("in-memory event store offline".to_string()));
        }

        self.events.write().await.push(event.clone());
        self.appended.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use exam_gateway_core::SecurityEventKind;

    fn key_at(millis: i64) -> WindowKey {
        WindowKey::new("ip:203.0.113.1", "auth/login", Utc.timestamp_millis_opt(millis).unwrap())
    }

    #[tokio::test]
    async fn test_upsert_creates_then_increments() {
        let store = InMemoryRateLimitStore::new();
        let key = key_at(0);

        assert_eq!(store.upsert_increment(&key).await.unwrap(), 1);
        assert_eq!(store.upsert_increment(&key).await.unwrap(), 2);
        assert_eq!(store.fetch_count(&key).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_new_window_creates_new_record() {
        let store = InMemoryRateLimitStore::new();
        store.upsert_increment(&key_at(0)).await.unwrap();
        store.upsert_increment(&key_at(60_000)).await.unwrap();

        let records = store.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.request_count == 1));
    }

    #[tokio::test]
    async fn test_non_atomic_store_reports_unsupported() {
        let store = InMemoryRateLimitStore::without_atomic_upsert();
        let result = store.upsert_increment(&key_at(0)).await;
        assert!(matches!(result, Err(CoreError::Unsupported(_))));

        store.store_count(&key_at(0), 3).await.unwrap();
        assert_eq!(store.fetch_count(&key_at(0)).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = InMemoryRateLimitStore::new();
        store.set_available(false);

        let err = store.upsert_increment(&key_at(0)).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_prune_before_removes_only_old_windows() {
        let store = InMemoryRateLimitStore::new();
        store.upsert_increment(&key_at(0)).await.unwrap();
        store.upsert_increment(&key_at(120_000)).await.unwrap();

        let cutoff = Utc.timestamp_millis_opt(60_000).unwrap();
        assert_eq!(store.prune_before(cutoff).await.unwrap(), 1);
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_event_store_append_and_wait() {
        let store = InMemorySecurityEventStore::new();
        let event = SecurityEvent::new(SecurityEventKind::AuthSuccess, Utc::now());

        store.append(&event).await.unwrap();
        assert!(store.wait_for(1, Duration::from_millis(10)).await);
        assert_eq!(store.events().await, vec![event]);
    }

    #[tokio::test]
    async fn test_event_store_wait_times_out() {
        let store = InMemorySecurityEventStore::new();
        assert!(!store.wait_for(1, Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_event_store_offline() {
        let store = InMemorySecurityEventStore::new();
        store.set_available(false);

        let event = SecurityEvent::new(SecurityEventKind::AuthSuccess, Utc::now());
        assert!(store.append(&event).await.is_err());
        assert!(store.is_empty().await);
    }
}
