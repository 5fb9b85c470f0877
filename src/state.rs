//! Shared application state injected into every request via `web::Data`.
//!
//! One `AppState` bundles the long-lived, process-scoped collaborators the
//! pipeline and proxy engine depend on, assembled once in `main` and cloned
//! (cheaply, behind `Arc`) into the `HttpServer::new` factory closure per
//! worker thread — the same shape the teacher's `main.rs` builds up from
//! individual `app_data` calls, collapsed into one struct because this
//! gateway's collaborators are more numerous and more interdependent than
//! the teacher's flat `RouteHandler`.

use std::sync::Arc;
use std::time::Instant;

use crate::middleware::auth::{ApiKeyValidator, BearerValidator};
use crate::models::settings::Settings;
use crate::routes::metrics::MetricsCollector;
use crate::services::cache::CacheManager;
use crate::services::circuit_breaker::CircuitBreakerManager;
use crate::services::http::ProxyEngine;
use crate::services::kv_store::KvStore;
use crate::services::rate_limiter::RateLimiter;
use crate::services::registry::BackendRegistry;
use crate::utils::route_matcher::RouteMatcher;

/// Spec §4.7(4): "configurable allow-all or allow-list." `allow_all` takes
/// precedence when set; otherwise a request's `Origin` is echoed back only
/// if it appears in `allowed_origins`.
#[derive(Clone, Debug)]
pub struct CorsPolicy {
    pub allow_all: bool,
    pub allowed_origins: Vec<String>,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allow_all: true,
            allowed_origins: Vec::new(),
        }
    }
}

impl CorsPolicy {
    pub fn allow_list(origins: Vec<String>) -> Self {
        Self {
            allow_all: false,
            allowed_origins: origins,
        }
    }
}

pub struct AppState {
    pub settings: Settings,
    pub route_matcher: Arc<RouteMatcher>,
    pub registry: Arc<BackendRegistry>,
    pub breakers: Arc<CircuitBreakerManager>,
    pub cache: Option<Arc<CacheManager>>,
    pub proxy: Arc<ProxyEngine>,
    pub rate_limiter: Arc<RateLimiter>,
    pub kv_store: Arc<dyn KvStore>,
    pub metrics: Arc<MetricsCollector>,
    pub bearer_validator: Option<Arc<BearerValidator>>,
    pub api_key_validator: Arc<ApiKeyValidator>,
    pub cors: CorsPolicy,
    pub content_type_allowlist: Vec<String>,
    pub started_at: Instant,
}

impl AppState {
    pub fn service_version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn service_name() -> &'static str {
        env!("CARGO_PKG_NAME")
    }
}
