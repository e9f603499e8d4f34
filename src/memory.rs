use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::RwLock;

use crate::backend::KeyValueBackend;
use crate::error::StorageError;

/// In-process key-value store with Redis-like `SET .. EX` semantics.
///
/// Used where a live Redis is unavailable; it also records how many writes
/// it received so callers can assert on attempt counts.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<RwLock<HashMap<String, MemoryEntry>>>,
    writes: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct MemoryEntry {
    value: String,
    stored_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    expiration: Duration,
}

/// Snapshot of a live entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRecord {
    pub key: String,
    pub value: String,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub expiration: Duration,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set_with_expiration` calls received, successful or not.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.entry(key).await.map(|record| record.value)
    }

    pub async fn entry(&self, key: &str) -> Option<MemoryRecord> {
        let mut guard = self.inner.write().await;
        let now = Utc::now();

        if let Some(entry) = guard.get(key) {
            if entry.is_expired(now) {
                guard.remove(key);
                return None;
            }

            return Some(entry.as_record(key));
        }

        None
    }

    pub async fn keys(&self) -> Vec<String> {
        let guard = self.inner.read().await;
        let now = Utc::now();
        let mut keys: Vec<String> = guard
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub async fn purge_expired(&self) -> usize {
        let mut guard = self.inner.write().await;
        let now = Utc::now();
        let before = guard.len();
        guard.retain(|_, entry| !entry.is_expired(now));
        before - guard.len()
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn set_with_expiration(
        &self,
        key: String,
        value: String,
        expiration: Duration,
    ) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);

        let now = Utc::now();
        let entry = MemoryEntry {
            value,
            stored_at: now,
            expires_at: now
                .checked_add_signed(chrono_duration(expiration))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            expiration,
        };

        let mut guard = self.inner.write().await;
        guard.insert(key, entry);

        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

impl MemoryEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    fn as_record(&self, key: &str) -> MemoryRecord {
        MemoryRecord {
            key: key.to_string(),
            value: self.value.clone(),
            stored_at: self.stored_at,
            expires_at: self.expires_at,
            expiration: self.expiration,
        }
    }
}

fn chrono_duration(duration: Duration) -> ChronoDuration {
    match ChronoDuration::from_std(duration) {
        Ok(value) => value,
        Err(_) => {
            // chrono caps at i64::MAX milliseconds
            const MAX_SECS: u64 = (i64::MAX / 1_000) as u64;
            let capped = duration.as_secs().min(MAX_SECS);
            ChronoDuration::seconds(capped as i64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_value_with_expiration() {
        let backend = MemoryBackend::new();
        backend
            .set_with_expiration("k".to_string(), "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let record = backend.entry("k").await.unwrap();
        assert_eq!(record.value, "v");
        assert_eq!(record.expiration, Duration::from_secs(60));
        assert_eq!(record.expires_at - record.stored_at, ChronoDuration::seconds(60));
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test]
    async fn overwrite_replaces_value() {
        let backend = MemoryBackend::new();
        for value in ["first", "second"] {
            backend
                .set_with_expiration("k".to_string(), value.to_string(), Duration::from_secs(60))
                .await
                .unwrap();
        }

        assert_eq!(backend.get("k").await.as_deref(), Some("second"));
        assert_eq!(backend.keys().await, vec!["k".to_string()]);
        assert_eq!(backend.write_count(), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_evicted() {
        let backend = MemoryBackend::new();
        backend
            .set_with_expiration("k".to_string(), "v".to_string(), Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(backend.keys().await.is_empty());
        assert_eq!(backend.purge_expired().await, 1);
        assert_eq!(backend.get("k").await, None);
    }

    #[test]
    fn huge_durations_are_capped() {
        let capped = chrono_duration(Duration::from_secs(u64::MAX));
        assert!(capped > ChronoDuration::days(365 * 1000));
    }
}
