//! Opaque string-keyed store with TTL and atomic increment (spec §4.1).
//!
//! Two implementations ship here: [`MemoryStore`] (in-process) and
//! [`RemoteStore`] (a structural adapter over an injected
//! [`RemoteBackend`]). The wire protocol for a real remote store — Redis,
//! Memcached, or otherwise — is out of core scope; `RemoteStore` only
//! supplies the atomic-increment and lazy-expiry contract on top of
//! whatever `RemoteBackend` a deployment plugs in.

use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("key not found")]
    NotFound,
    #[error("transport error: {0}")]
    Transport(String),
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

const DEFAULT_INCREMENT_TTL: Duration = Duration::from_secs(3_600);

/// Core KV Store contract. `ttl == Duration::ZERO` means "no expiry".
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, KvError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), KvError>;
    async fn delete(&self, key: &str) -> Result<(), KvError>;
    async fn exists(&self, key: &str) -> Result<bool, KvError>;
    /// Atomic against concurrent callers. Absent/expired keys are treated
    /// as 0 and assigned a default one-hour TTL.
    async fn increment(&self, key: &str, delta: i64) -> Result<i64, KvError>;
    async fn close(&self) -> Result<(), KvError>;
}

struct Entry {
    value: Vec<u8>,
    expires_at_unix: u64, // 0 == never
}

impl Entry {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at_unix != 0 && now >= self.expires_at_unix
    }
}

/// In-process implementation backed by a `HashMap`, with a background
/// sweeper removing expired entries on a fixed interval.
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        let store = Arc::new(Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        });
        store.spawn_sweeper(Duration::from_secs(60));
        store
    }

    fn spawn_sweeper(self: &Arc<Self>, interval: Duration) {
        let data = self.data.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = now_unix_secs();
                let mut guard = data.write().await;
                let before = guard.len();
                guard.retain(|_, entry| !entry.is_expired(now));
                let removed = before - guard.len();
                if removed > 0 {
                    debug!("kv store sweeper removed {} expired entries", removed);
                }
            }
        });
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, KvError> {
        let now = now_unix_secs();
        let guard = self.data.read().await;
        match guard.get(key) {
            Some(entry) if !entry.is_expired(now) => Ok(entry.value.clone()),
            _ => Err(KvError::NotFound),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), KvError> {
        let expires_at_unix = if ttl.is_zero() {
            0
        } else {
            now_unix_secs() + ttl.as_secs()
        };
        self.data.write().await.insert(
            key.to_string(),
            Entry {
                value,
                expires_at_unix,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let now = now_unix_secs();
        Ok(self
            .data
            .read()
            .await
            .get(key)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false))
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64, KvError> {
        let now = now_unix_secs();
        let mut guard = self.data.write().await;
        let current = match guard.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .unwrap_or(0)
            }
            _ => 0,
        };
        let new_value = current + delta;
        let expires_at_unix = match guard.get(key) {
            Some(entry) if !entry.is_expired(now) => entry.expires_at_unix,
            _ => now + DEFAULT_INCREMENT_TTL.as_secs(),
        };
        guard.insert(
            key.to_string(),
            Entry {
                value: new_value.to_string().into_bytes(),
                expires_at_unix,
            },
        );
        Ok(new_value)
    }

    async fn close(&self) -> Result<(), KvError> {
        Ok(())
    }
}

/// Minimal transport a remote KV backend must provide. A concrete
/// Redis/Memcached client is a non-goal of the core; this trait is the
/// seam a deployment plugs a real client into.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn raw_get(&self, key: &str) -> Result<Option<Vec<u8>>, String>;
    async fn raw_set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), String>;
    async fn raw_delete(&self, key: &str) -> Result<(), String>;
    /// Must be atomic server-side (e.g. a Lua script or `INCRBY`), never a
    /// network read-modify-write loop.
    async fn raw_increment(&self, key: &str, delta: i64, default_ttl: Duration) -> Result<i64, String>;
    async fn raw_ping(&self) -> Result<(), String>;
}

pub struct RemoteStore<B: RemoteBackend> {
    backend: Arc<B>,
}

impl<B: RemoteBackend> RemoteStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: RemoteBackend> KvStore for RemoteStore<B> {
    async fn get(&self, key: &str) -> Result<Vec<u8>, KvError> {
        self.backend
            .raw_get(key)
            .await
            .map_err(KvError::Transport)?
            .ok_or(KvError::NotFound)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), KvError> {
        self.backend
            .raw_set(key, value, ttl)
            .await
            .map_err(KvError::Transport)
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.backend.raw_delete(key).await.map_err(KvError::Transport)
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        match self.backend.raw_get(key).await.map_err(KvError::Transport)? {
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64, KvError> {
        self.backend
            .raw_increment(key, delta, DEFAULT_INCREMENT_TTL)
            .await
            .map_err(KvError::Transport)
    }

    async fn close(&self) -> Result<(), KvError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = MemoryStore::new();
        store
            .set("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), b"v".to_vec());
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.get("missing").await, Err(KvError::NotFound)));
    }

    #[tokio::test]
    async fn set_then_delete_then_exists_is_false() {
        let store = MemoryStore::new();
        store.set("k", b"v".to_vec(), Duration::ZERO).await.unwrap();
        store.delete("k").await.unwrap();
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn increment_on_absent_key_starts_at_delta() {
        let store = MemoryStore::new();
        let value = store.increment("counter", 5).await.unwrap();
        assert_eq!(value, 5);
        let value = store.increment("counter", 3).await.unwrap();
        assert_eq!(value, 8);
    }

    #[tokio::test]
    async fn zero_ttl_never_expires() {
        let store = MemoryStore::new();
        store.set("k", b"v".to_vec(), Duration::ZERO).await.unwrap();
        assert!(store.exists("k").await.unwrap());
    }
}
