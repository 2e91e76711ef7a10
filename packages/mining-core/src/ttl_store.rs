//! TTLStore (spec §4.12): get/set with TTL, delete, exists, extend-TTL,
//! and an NX+EX distributed lock. The production backend is Redis-shaped
//! (`MiningConfig::ttl_store_url`); this module only depends on the
//! [`TtlStore`] trait so orchestration code never talks to a concrete
//! store, which is why orchestration code only ever sees the trait.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::error::{MiningError, Result};

/// Reject payloads above this size outright (spec §4.12).
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024 * 1024;
/// Warn (but still accept) payloads above this size.
pub const WARN_PAYLOAD_BYTES: usize = 100 * 1024 * 1024;

#[async_trait]
pub trait TtlStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn extend_ttl(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Acquire a lock (`SET key value NX EX ttl` semantics). Returns
    /// `true` if the lock was acquired, `false` if it's already held.
    async fn acquire_lock(&self, key: &str, ttl: Duration) -> Result<bool>;
    async fn release_lock(&self, key: &str) -> Result<()>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process `TtlStore` for tests and single-worker deployments. Mirrors
/// the shape of a Redis-backed implementation closely enough that
/// swapping one in later only touches this file.
#[derive(Default)]
pub struct InMemoryTtlStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryTtlStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(entry: &Entry) -> bool {
        entry.expires_at > Instant::now()
    }
}

#[async_trait]
impl TtlStore for InMemoryTtlStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.entries.get(key) {
            Some(entry) if Self::is_live(&entry) => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        if value.len() > MAX_PAYLOAD_BYTES {
            return Err(MiningError::Budget(format!(
                "payload for {key} exceeds max TTL store size of {MAX_PAYLOAD_BYTES} bytes"
            )));
        }
        if value.len() > WARN_PAYLOAD_BYTES {
            tracing::warn!(key, bytes = value.len(), "large TTL store payload");
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn extend_ttl(&self, key: &str, ttl: Duration) -> Result<()> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Instant::now() + ttl;
        }
        Ok(())
    }

    async fn acquire_lock(&self, key: &str, ttl: Duration) -> Result<bool> {
        let lock_key = format!("lock:{key}");
        if self.exists(&lock_key).await? {
            return Ok(false);
        }
        self.set(&lock_key, b"1".to_vec(), ttl).await?;
        Ok(true)
    }

    async fn release_lock(&self, key: &str) -> Result<()> {
        self.delete(&format!("lock:{key}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let store = InMemoryTtlStore::new();
        store
            .set("k", b"hello".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn expired_entries_return_none() {
        let store = InMemoryTtlStore::new();
        store
            .set("k", b"hello".to_vec(), Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_payload_rejected() {
        let store = InMemoryTtlStore::new();
        let huge = vec![0u8; MAX_PAYLOAD_BYTES + 1];
        let err = store.set("k", huge, Duration::from_secs(60)).await;
        assert!(matches!(err, Err(MiningError::Budget(_))));
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let store = InMemoryTtlStore::new();
        assert!(store.acquire_lock("job-1", Duration::from_secs(60)).await.unwrap());
        assert!(!store.acquire_lock("job-1", Duration::from_secs(60)).await.unwrap());
        store.release_lock("job-1").await.unwrap();
        assert!(store.acquire_lock("job-1", Duration::from_secs(60)).await.unwrap());
    }
}
