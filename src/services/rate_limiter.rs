//! Token bucket rate limiter over the KV Store (spec §4.3).

use super::kv_store::{KvError, KvStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

fn bucket_key(client_id: &str, route_path: &str) -> String {
    format!("bucket:{}:{}", client_id, route_path)
}

fn timestamp_key(client_id: &str, route_path: &str) -> String {
    format!("timestamp:{}:{}", client_id, route_path)
}

/// Per-`(client_id, route_path)` token bucket. The read-decide-write
/// sequence is made atomic per key with an in-process mutex in addition
/// to whatever atomicity the underlying `KvStore` provides — naive
/// read-modify-write across a remote store would race, so every `allow`
/// call for a given key is additionally serialized here regardless of
/// which `KvStore` implementation backs it.
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    capacity: u64,
    refill_rate: u64,
    refill_period: Duration,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowDecision {
    Allow { tokens_remaining: u64 },
    Deny,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, capacity: u64, refill_rate: u64, refill_period: Duration) -> Self {
        Self {
            store,
            capacity,
            refill_rate,
            refill_period,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut guard = self.key_locks.lock().await;
        guard
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs the algorithm from the design: load tokens/last_refill
    /// (defaulting absent values to capacity/now), compute the refill,
    /// then either deny (writing nothing) or consume one token and
    /// persist. Denied calls intentionally do not advance the refill
    /// clock — preserved from the source behavior per the design notes.
    pub async fn allow(&self, client_id: &str, route_path: &str) -> AllowDecision {
        self.allow_override(client_id, route_path, self.capacity, self.refill_rate)
            .await
    }

    /// Same algorithm as [`Self::allow`], but with the capacity/refill-rate
    /// pair supplied by the caller instead of the struct's configured
    /// defaults — used when a route or an authenticated principal declares
    /// its own override (spec §4.3, §4.7.9).
    pub async fn allow_override(
        &self,
        client_id: &str,
        route_path: &str,
        capacity: u64,
        refill_rate: u64,
    ) -> AllowDecision {
        let bkey = bucket_key(client_id, route_path);
        let tkey = timestamp_key(client_id, route_path);
        let per_key_lock = self.lock_for(&bkey).await;
        let _guard = per_key_lock.lock().await;

        let now = now_unix_secs();
        let tokens = self.load_u64(&bkey).await.unwrap_or(capacity);
        let last_refill = self.load_u64(&tkey).await.unwrap_or(now);

        let elapsed = now.saturating_sub(last_refill);
        let to_add = (elapsed * refill_rate) / self.refill_period.as_secs().max(1);
        let tokens = capacity.min(tokens + to_add);

        if tokens == 0 {
            return AllowDecision::Deny;
        }

        let tokens_remaining = tokens - 1;
        let _ = self
            .store
            .set(&bkey, tokens_remaining.to_string().into_bytes(), Duration::ZERO)
            .await;
        let _ = self
            .store
            .set(&tkey, now.to_string().into_bytes(), Duration::ZERO)
            .await;

        AllowDecision::Allow { tokens_remaining }
    }

    async fn load_u64(&self, key: &str) -> Option<u64> {
        match self.store.get(key).await {
            Ok(bytes) => std::str::from_utf8(&bytes).ok()?.parse().ok(),
            Err(KvError::NotFound) => None,
            Err(KvError::Transport(_)) => None,
        }
    }

    /// Clears both the token and timestamp keys for `key`.
    pub async fn reset(&self, client_id: &str, route_path: &str) {
        let bkey = bucket_key(client_id, route_path);
        let tkey = timestamp_key(client_id, route_path);
        let _ = self.store.delete(&bkey).await;
        let _ = self.store.delete(&tkey).await;
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> u64 {
        self.refill_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::kv_store::MemoryStore;

    fn limiter(capacity: u64, rate: u64, period: Duration) -> RateLimiter {
        RateLimiter::new(MemoryStore::new(), capacity, rate, period)
    }

    #[tokio::test]
    async fn capacity_consecutive_allows_then_one_deny() {
        let rl = limiter(5, 5, Duration::from_secs(60));
        for _ in 0..5 {
            assert!(matches!(
                rl.allow("client", "/path").await,
                AllowDecision::Allow { .. }
            ));
        }
        assert_eq!(rl.allow("client", "/path").await, AllowDecision::Deny);
    }

    #[tokio::test]
    async fn reset_allows_capacity_consecutive_calls_again() {
        let rl = limiter(3, 3, Duration::from_secs(60));
        for _ in 0..3 {
            rl.allow("client", "/path").await;
        }
        assert_eq!(rl.allow("client", "/path").await, AllowDecision::Deny);
        rl.reset("client", "/path").await;
        for _ in 0..3 {
            assert!(matches!(
                rl.allow("client", "/path").await,
                AllowDecision::Allow { .. }
            ));
        }
        assert_eq!(rl.allow("client", "/path").await, AllowDecision::Deny);
    }

    #[tokio::test]
    async fn distinct_paths_have_independent_buckets() {
        let rl = limiter(1, 1, Duration::from_secs(60));
        assert!(matches!(
            rl.allow("client", "/a").await,
            AllowDecision::Allow { .. }
        ));
        assert!(matches!(
            rl.allow("client", "/b").await,
            AllowDecision::Allow { .. }
        ));
    }
}
