//! Distributed mutex: at most one holder per key, fail-fast on contention,
//! auto-expiring after its TTL so a dead holder never wedges the lock.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_nats::jetstream;
use async_nats::jetstream::kv;
use async_trait::async_trait;

use crate::error::MutexError;

/// A distributed, TTL-expiring, fail-fast mutex keyed by string.
#[async_trait]
pub trait DistributedMutex: Send + Sync {
    /// Acquires `key` for `ttl`. Fails immediately (no reblocking) if
    /// already held and not yet expired.
    async fn lock(&self, key: &str, ttl: Duration) -> Result<(), MutexError>;

    /// Releases `key`. Releasing a key this holder doesn't hold is not an
    /// error: the caller's intent is already satisfied.
    async fn unlock(&self, key: &str) -> Result<(), MutexError>;

    /// Re-acquires `key` for a fresh `ttl` without releasing it in between.
    /// Used by the leader to extend its lease at half its TTL.
    async fn extend(&self, key: &str, ttl: Duration) -> Result<(), MutexError>;
}

struct Entry {
    expires_at: std::time::Instant,
}

/// An in-process mutex for tests and single-controller deployments.
#[derive(Default)]
pub struct InMemoryMutex {
    holders: StdMutex<HashMap<String, Entry>>,
}

impl InMemoryMutex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(entry: &Entry) -> bool {
        entry.expires_at > std::time::Instant::now()
    }
}

#[async_trait]
impl DistributedMutex for InMemoryMutex {
    async fn lock(&self, key: &str, ttl: Duration) -> Result<(), MutexError> {
        let mut holders = self.holders.lock().expect("mutex table poisoned");
        if let Some(existing) = holders.get(key) {
            if Self::is_live(existing) {
                return Err(MutexError::Contended { key: key.to_string() });
            }
        }
        holders.insert(
            key.to_string(),
            Entry { expires_at: std::time::Instant::now() + ttl },
        );
        Ok(())
    }

    async fn unlock(&self, key: &str) -> Result<(), MutexError> {
        self.holders.lock().expect("mutex table poisoned").remove(key);
        Ok(())
    }

    async fn extend(&self, key: &str, ttl: Duration) -> Result<(), MutexError> {
        let mut holders = self.holders.lock().expect("mutex table poisoned");
        match holders.get(key) {
            Some(existing) if Self::is_live(existing) => {
                holders.insert(
                    key.to_string(),
                    Entry { expires_at: std::time::Instant::now() + ttl },
                );
                Ok(())
            }
            _ => Err(MutexError::Contended { key: key.to_string() }),
        }
    }
}

/// A JetStream KV-backed mutex. `lock` is a create-if-absent `Put` of an
/// expiry timestamp; `unlock` deletes the key; a key whose stored expiry
/// has passed is treated as absent even if the delete never happened.
pub struct NatsMutex {
    kv: kv::Store,
}

impl NatsMutex {
    /// Creates or opens the KV bucket `bucket` for mutex storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket cannot be created or opened.
    pub async fn new(jetstream: &jetstream::Context, bucket: &str) -> Result<Self, MutexError> {
        let kv = jetstream
            .create_key_value(kv::Config {
                bucket: bucket.to_string(),
                ..Default::default()
            })
            .await
            .map_err(|e| MutexError::Backend { message: e.to_string() })?;
        Ok(Self { kv })
    }

    fn now_millis() -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis()
    }

    async fn is_expired(&self, key: &str) -> Result<bool, MutexError> {
        match self.kv.get(key).await.map_err(|e| MutexError::Backend { message: e.to_string() })? {
            None => Ok(true),
            Some(bytes) => {
                let expires_at: u128 = std::str::from_utf8(&bytes)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                Ok(expires_at <= Self::now_millis())
            }
        }
    }
}

#[async_trait]
impl DistributedMutex for NatsMutex {
    async fn lock(&self, key: &str, ttl: Duration) -> Result<(), MutexError> {
        if !self.is_expired(key).await? {
            return Err(MutexError::Contended { key: key.to_string() });
        }
        // The previous holder's key may still be present past expiry;
        // delete before create so a stale, unexpired-looking revision
        // doesn't reject the create below.
        let _ = self.kv.delete(key).await;

        let expires_at = Self::now_millis() + ttl.as_millis();
        self.kv
            .create(key, expires_at.to_string().into())
            .await
            .map_err(|_| MutexError::Contended { key: key.to_string() })?;
        Ok(())
    }

    async fn unlock(&self, key: &str) -> Result<(), MutexError> {
        self.kv
            .delete(key)
            .await
            .map_err(|e| MutexError::Backend { message: e.to_string() })
    }

    async fn extend(&self, key: &str, ttl: Duration) -> Result<(), MutexError> {
        let expires_at = Self::now_millis() + ttl.as_millis();
        self.kv
            .put(key, expires_at.to_string().into())
            .await
            .map_err(|e| MutexError::Backend { message: e.to_string() })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_excludes_a_second_holder() {
        let mutex = InMemoryMutex::new();
        mutex.lock("run-1", Duration::from_secs(10)).await.unwrap();
        let err = mutex.lock("run-1", Duration::from_secs(10)).await.unwrap_err();
        assert!(matches!(err, MutexError::Contended { .. }));
    }

    #[tokio::test]
    async fn unlock_then_lock_succeeds() {
        let mutex = InMemoryMutex::new();
        mutex.lock("run-1", Duration::from_secs(10)).await.unwrap();
        mutex.unlock("run-1").await.unwrap();
        mutex.lock("run-1", Duration::from_secs(10)).await.unwrap();
    }

    #[tokio::test]
    async fn expired_lock_can_be_reacquired() {
        let mutex = InMemoryMutex::new();
        mutex.lock("run-1", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        mutex.lock("run-1", Duration::from_secs(10)).await.unwrap();
    }

    #[tokio::test]
    async fn extend_requires_a_live_hold() {
        let mutex = InMemoryMutex::new();
        let err = mutex.extend("run-1", Duration::from_secs(10)).await.unwrap_err();
        assert!(matches!(err, MutexError::Contended { .. }));

        mutex.lock("run-1", Duration::from_secs(10)).await.unwrap();
        mutex.extend("run-1", Duration::from_secs(10)).await.unwrap();
    }

    #[tokio::test]
    async fn unlock_of_unheld_key_is_not_an_error() {
        let mutex = InMemoryMutex::new();
        mutex.unlock("never-held").await.unwrap();
    }
}
