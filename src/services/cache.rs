//! Two-tier response cache (spec §4.2): an in-process L1, an optional
//! remote-backed L2, and a `CacheManager` composing the two with
//! promotion-on-L2-hit semantics.

use super::kv_store::{KvError, KvStore};
use async_trait::async_trait;
use log::warn;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache miss")]
    Miss,
    #[error("cache backend error: {0}")]
    Backend(String),
}

#[derive(Clone)]
pub struct CacheEntry {
    pub bytes: Vec<u8>,
    /// `None` means "no expiry".
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError>;
    async fn set(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
    async fn close(&self) -> Result<(), CacheError>;
    fn default_ttl(&self) -> Duration;
}

/// In-process L1. Eviction on a full map picks the entry with the
/// earliest expiry (ties broken arbitrarily by map iteration order); a
/// background sweeper removes expired entries in bounded chunks so it
/// never holds the write lock across the whole map long enough to starve
/// readers.
pub struct L1Cache {
    data: Arc<RwLock<HashMap<String, CacheEntry>>>,
    max_size: usize,
    default_ttl: Duration,
}

impl L1Cache {
    pub fn new(max_size: usize, default_ttl: Duration) -> Arc<Self> {
        let cache = Arc::new(Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            max_size,
            default_ttl,
        });
        cache.spawn_sweeper(Duration::from_secs(60));
        cache
    }

    fn spawn_sweeper(self: &Arc<Self>, interval: Duration) {
        let data = self.data.clone();
        const CHUNK: usize = 256;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let expired_keys: Vec<String> = {
                    let guard = data.read().await;
                    guard
                        .iter()
                        .filter(|(_, e)| e.is_expired(now))
                        .map(|(k, _)| k.clone())
                        .collect()
                };
                for chunk in expired_keys.chunks(CHUNK) {
                    let mut guard = data.write().await;
                    for key in chunk {
                        guard.remove(key);
                    }
                    drop(guard);
                    tokio::task::yield_now().await;
                }
            }
        });
    }

    async fn evict_one_if_full(&self, guard: &mut HashMap<String, CacheEntry>) {
        if guard.len() < self.max_size {
            return;
        }
        let victim = guard
            .iter()
            .min_by_key(|(_, e)| e.expires_at.unwrap_or(Instant::now() + Duration::from_secs(3_153_600_000)))
            .map(|(k, _)| k.clone());
        if let Some(key) = victim {
            guard.remove(&key);
        }
    }
}

#[async_trait]
impl Cache for L1Cache {
    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        let now = Instant::now();
        let guard = self.data.read().await;
        match guard.get(key) {
            Some(entry) if !entry.is_expired(now) => Ok(entry.bytes.clone()),
            _ => Err(CacheError::Miss),
        }
    }

    async fn set(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        let mut guard = self.data.write().await;
        if !guard.contains_key(key) {
            self.evict_one_if_full(&mut guard).await;
        }
        guard.insert(key.to_string(), CacheEntry { bytes, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .data
            .read()
            .await
            .get(key)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false))
    }

    async fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

/// L2 adapter over any [`KvStore`] — the remote cache implementation
/// itself is out of core scope; this only maps `Cache` semantics onto the
/// KV Store contract.
pub struct L2Cache {
    store: Arc<dyn KvStore>,
    default_ttl: Duration,
}

impl L2Cache {
    pub fn new(store: Arc<dyn KvStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }
}

#[async_trait]
impl Cache for L2Cache {
    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        match self.store.get(key).await {
            Ok(bytes) => Ok(bytes),
            Err(KvError::NotFound) => Err(CacheError::Miss),
            Err(KvError::Transport(msg)) => Err(CacheError::Backend(msg)),
        }
    }

    async fn set(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.store
            .set(key, bytes, ttl)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store
            .delete(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.store
            .exists(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.store
            .close()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

/// Composes L1 and an optional L2 per the Manager semantics in the
/// design: read L1 first, promote on L2 hit; write L1 synchronously and
/// best-effort L2 (L2 write failures are logged, never propagated);
/// delete from L1 always, L2 best-effort; exists is a logical OR.
pub struct CacheManager {
    l1: Arc<dyn Cache>,
    l2: Option<Arc<dyn Cache>>,
}

impl CacheManager {
    pub fn new(l1: Arc<dyn Cache>, l2: Option<Arc<dyn Cache>>) -> Self {
        Self { l1, l2 }
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        match self.l1.get(key).await {
            Ok(bytes) => Ok(bytes),
            Err(CacheError::Miss) => {
                let Some(l2) = &self.l2 else {
                    return Err(CacheError::Miss);
                };
                match l2.get(key).await {
                    Ok(bytes) => {
                        let _ = self.l1.set(key, bytes.clone(), self.l1.default_ttl()).await;
                        Ok(bytes)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    pub async fn set(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.l1.set(key, bytes.clone(), ttl).await?;
        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.set(key, bytes, ttl).await {
                warn!("L2 cache write failed for key {}: {}", key, e);
            }
        }
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let result = self.l1.delete(key).await;
        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.delete(key).await {
                warn!("L2 cache delete failed for key {}: {}", key, e);
            }
        }
        result
    }

    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        if self.l1.exists(key).await.unwrap_or(false) {
            return Ok(true);
        }
        if let Some(l2) = &self.l2 {
            return Ok(l2.exists(key).await.unwrap_or(false));
        }
        Ok(false)
    }
}

/// `generate_cache_key` is a pure function of `(method, url)`.
pub fn generate_cache_key(method: &str, url: &str) -> String {
    format!("{}:{}", method, url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn l1_set_then_get_round_trips() {
        let l1 = L1Cache::new(10, Duration::from_secs(60));
        l1.set("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(l1.get("k").await.unwrap(), b"v".to_vec());
    }

    #[tokio::test]
    async fn manager_promotes_l2_hit_into_l1() {
        let l1 = L1Cache::new(10, Duration::from_secs(60));
        let kv = super::super::kv_store::MemoryStore::new();
        let l2 = Arc::new(L2Cache::new(kv, Duration::from_secs(60)));
        l2.set("k", b"from-l2".to_vec(), Duration::from_secs(60)).await.unwrap();

        let manager = CacheManager::new(l1.clone(), Some(l2));
        let value = manager.get("k").await.unwrap();
        assert_eq!(value, b"from-l2".to_vec());
        // promoted into L1
        assert_eq!(l1.get("k").await.unwrap(), b"from-l2".to_vec());
    }

    #[tokio::test]
    async fn manager_delete_then_exists_is_false() {
        let l1 = L1Cache::new(10, Duration::from_secs(60));
        let manager = CacheManager::new(l1, None);
        manager.set("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        manager.delete("k").await.unwrap();
        assert!(!manager.exists("k").await.unwrap());
    }

    #[test]
    fn cache_key_is_pure_function_of_method_and_url() {
        assert_eq!(
            generate_cache_key("GET", "/api/v1/x"),
            generate_cache_key("GET", "/api/v1/x")
        );
        assert_ne!(
            generate_cache_key("GET", "/api/v1/x"),
            generate_cache_key("POST", "/api/v1/x")
        );
    }
}
