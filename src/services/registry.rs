//! Backend registry and background health prober (spec §4.5).

use crate::models::backend::Backend;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Registry operations and per-backend health updates use separate locks
/// (the map lock here, `Backend`'s own atomic flag for health) so lookups
/// never contend with probes.
pub struct BackendRegistry {
    backends: RwLock<HashMap<String, Backend>>,
    http_client: reqwest::Client,
}

impl BackendRegistry {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
            http_client,
        }
    }

    pub async fn add(&self, backend: Backend) {
        self.backends.write().await.insert(backend.name.clone(), backend);
    }

    /// Returns the backend only if it is currently healthy.
    pub async fn get(&self, name: &str) -> Option<Backend> {
        self.backends
            .read()
            .await
            .get(name)
            .filter(|b| b.is_healthy())
            .cloned()
    }

    /// Returns the backend regardless of health.
    pub async fn get_by_name(&self, name: &str) -> Option<Backend> {
        self.backends.read().await.get(name).cloned()
    }

    pub async fn get_all(&self) -> Vec<Backend> {
        self.backends.read().await.values().cloned().collect()
    }

    pub async fn get_healthy(&self) -> Vec<Backend> {
        self.backends
            .read()
            .await
            .values()
            .filter(|b| b.is_healthy())
            .cloned()
            .collect()
    }

    pub async fn set_health(&self, name: &str, healthy: bool) {
        if let Some(backend) = self.backends.read().await.get(name) {
            backend.set_healthy(healthy);
        }
    }

    pub async fn trigger_health_check(&self, name: &str) {
        let backend = self.backends.read().await.get(name).cloned();
        if let Some(backend) = backend {
            self.probe_one(&backend).await;
        }
    }

    async fn probe_one(&self, backend: &Backend) {
        if !backend.probing_enabled() {
            return;
        }
        let healthy = match self
            .http_client
            .get(backend.health_url())
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!("health probe failed for backend {}: {}", backend.name, e);
                false
            }
        };
        if healthy != backend.is_healthy() {
            debug!(
                "backend {} health transitioned to {}",
                backend.name, healthy
            );
        }
        backend.set_healthy(healthy);
    }

    /// Probes run concurrently across backends.
    async fn probe_all(&self) {
        let backends = self.get_all().await;
        let futures = backends.iter().map(|b| self.probe_one(b));
        futures::future::join_all(futures).await;
    }

    pub fn start_health_checks(self: &Arc<Self>, interval: Duration) {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.probe_all().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> reqwest::Client {
        reqwest::Client::new()
    }

    #[tokio::test]
    async fn get_returns_none_for_unhealthy_backend() {
        let registry = BackendRegistry::new(client());
        let backend = Backend::new("b", "http://localhost:1", "/health", 1).unwrap();
        backend.set_healthy(false);
        registry.add(backend).await;
        assert!(registry.get("b").await.is_none());
        assert!(registry.get_by_name("b").await.is_some());
    }

    #[tokio::test]
    async fn disabled_health_path_leaves_health_untouched() {
        let registry = BackendRegistry::new(client());
        let backend = Backend::new("b", "http://localhost:1", "", 1).unwrap();
        registry.add(backend).await;
        registry.trigger_health_check("b").await;
        assert!(registry.get("b").await.is_some());
    }

    #[tokio::test]
    async fn get_healthy_filters_unhealthy_backends() {
        let registry = BackendRegistry::new(client());
        let healthy = Backend::new("a", "http://localhost:1", "/h", 1).unwrap();
        let unhealthy = Backend::new("b", "http://localhost:1", "/h", 1).unwrap();
        unhealthy.set_healthy(false);
        registry.add(healthy).await;
        registry.add(unhealthy).await;
        let result = registry.get_healthy().await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "a");
    }
}
