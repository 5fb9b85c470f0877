//! Upstream backend entries owned by the registry.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A named upstream service.
///
/// Created at startup from configuration and never destroyed during the
/// process lifetime; `healthy` is the only field that mutates afterward,
/// and it does so through its own lock-free flag so health updates never
/// contend with registry lookups.
#[derive(Clone)]
pub struct Backend {
    pub name: String,
    pub base_url: String,
    pub health_path: String,
    pub weight: u32,
    healthy: Arc<AtomicBool>,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendConfigError {
    #[error("backend name must not be empty")]
    EmptyName,
    #[error("backend '{name}' has an invalid base_url '{base_url}': {reason}")]
    InvalidBaseUrl {
        name: String,
        base_url: String,
        reason: String,
    },
    #[error("backend '{name}' weight must be greater than zero")]
    NonPositiveWeight { name: String },
}

impl Backend {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        health_path: impl Into<String>,
        weight: u32,
    ) -> Result<Self, BackendConfigError> {
        let name = name.into();
        let base_url = base_url.into();
        if name.is_empty() {
            return Err(BackendConfigError::EmptyName);
        }
        if weight == 0 {
            return Err(BackendConfigError::NonPositiveWeight { name });
        }
        let parsed = url::Url::parse(&base_url).map_err(|e| BackendConfigError::InvalidBaseUrl {
            name: name.clone(),
            base_url: base_url.clone(),
            reason: e.to_string(),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(BackendConfigError::InvalidBaseUrl {
                name,
                base_url,
                reason: "scheme must be http or https".into(),
            });
        }
        Ok(Self {
            name,
            base_url,
            health_path: health_path.into(),
            weight,
            healthy: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
    }

    /// Probing is disabled for backends with an empty health path; they
    /// stay at their last-set health (defaults to healthy).
    pub fn probing_enabled(&self) -> bool {
        !self.health_path.is_empty()
    }

    pub fn health_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.health_path
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSpec {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub health_check: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_scheme() {
        let err = Backend::new("b", "ftp://host", "/health", 1).unwrap_err();
        assert!(matches!(err, BackendConfigError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn rejects_zero_weight() {
        let err = Backend::new("b", "http://host", "/health", 0).unwrap_err();
        assert!(matches!(err, BackendConfigError::NonPositiveWeight { .. }));
    }

    #[test]
    fn empty_health_path_disables_probing() {
        let b = Backend::new("b", "http://host", "", 1).unwrap();
        assert!(!b.probing_enabled());
        assert!(b.is_healthy());
    }

    #[test]
    fn health_url_joins_cleanly() {
        let b = Backend::new("b", "http://host:8080/", "/healthz", 1).unwrap();
        assert_eq!(b.health_url(), "http://host:8080/healthz");
    }
}
