//! The proxy engine: cache short-circuit, backend lookup, breaker-wrapped
//! forwarding, and response/cache writeback (spec §4.6).

use super::cache::{generate_cache_key, CacheError, CacheManager};
use super::circuit_breaker::{CircuitBreakerError, CircuitBreakerManager};
use super::registry::BackendRegistry;
use crate::models::error::GatewayError;
use actix_web::http::header::{HeaderName, HeaderValue};
use bytes::Bytes;
use log::{error, warn};
use once_cell::sync::OnceCell;
use std::str::FromStr;
use std::time::Duration;

/// Headers that must never be copied verbatim to the upstream request —
/// hop-by-hop headers the connection layer manages itself.
const SKIPPED_REQUEST_HEADER_PREFIXES: &[&str] = &["host", "connection", "upgrade", "proxy-connection"];

pub struct ProxyRequest {
    pub method: String,
    pub path_and_query: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub remote_addr: String,
    pub scheme: String,
    pub host: String,
}

pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// The proxy engine. The HTTP client is a single, lazily constructed
/// instance, guarded by a one-shot cell so construction happens at most
/// once regardless of how many concurrent first-callers race it.
pub struct ProxyEngine {
    client_cell: OnceCell<reqwest::Client>,
    registry: std::sync::Arc<BackendRegistry>,
    breakers: std::sync::Arc<CircuitBreakerManager>,
    cache: Option<std::sync::Arc<CacheManager>>,
}

impl ProxyEngine {
    pub fn new(
        registry: std::sync::Arc<BackendRegistry>,
        breakers: std::sync::Arc<CircuitBreakerManager>,
        cache: Option<std::sync::Arc<CacheManager>>,
    ) -> Self {
        Self {
            client_cell: OnceCell::new(),
            registry,
            breakers,
            cache,
        }
    }

    fn client(&self) -> &reqwest::Client {
        self.client_cell.get_or_init(|| {
            reqwest::Client::builder()
                .pool_max_idle_per_host(32)
                .pool_idle_timeout(Duration::from_secs(90))
                .tcp_keepalive(Duration::from_secs(60))
                .connect_timeout(Duration::from_secs(10))
                .no_gzip()
                .no_brotli()
                .build()
                .expect("static reqwest client configuration is always valid")
        })
    }

    pub async fn serve(
        &self,
        req: ProxyRequest,
        backend_name: &str,
        cache_ttl: Duration,
    ) -> Result<ProxyResponse, GatewayError> {
        let cache_key = generate_cache_key(&req.method, &req.path_and_query);

        // 1. Cache short-circuit.
        if req.method == "GET" && !cache_ttl.is_zero() {
            if let Some(cache) = &self.cache {
                match cache.get(&cache_key).await {
                    Ok(bytes) => {
                        return Ok(ProxyResponse {
                            status: 200,
                            headers: Vec::new(),
                            body: Bytes::from(bytes),
                        });
                    }
                    Err(CacheError::Miss) => {}
                    Err(e) => warn!("cache read error for {}: {}", cache_key, e),
                }
            }
        }

        // 2. Backend lookup.
        let backend = self
            .registry
            .get(backend_name)
            .await
            .ok_or_else(|| GatewayError::BackendUnavailable {
                message: format!("backend '{}' missing or unhealthy", backend_name),
            })?;

        // 3. Breaker wrap.
        let breaker = self.breakers.get_or_create(backend_name).await;
        let client = self.client();
        let url = join_url(&backend.base_url, &req.path_and_query);

        let outcome = breaker
            .call(|| dispatch(client, &req, &url))
            .await;

        let (status, headers, body) = match outcome {
            Ok(triple) => triple,
            Err(CircuitBreakerError::CircuitOpen) => {
                return Err(GatewayError::BreakerOpen {
                    backend: backend_name.to_string(),
                })
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                return Err(GatewayError::BackendUnavailable { message: e })
            }
        };

        // 5. Cache write.
        if req.method == "GET" && status == 200 && !cache_ttl.is_zero() {
            if let Some(cache) = &self.cache {
                if let Err(e) = cache.set(&cache_key, body.to_vec(), cache_ttl).await {
                    warn!("cache write error for {}: {}", cache_key, e);
                }
            }
        }

        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }
}

/// Performs (a) request construction and (b) header propagation + send,
/// reporting 5xx/transport failures to the breaker as failures and 4xx as
/// success, per the design's "what counts as failure" rule.
async fn dispatch(
    client: &reqwest::Client,
    req: &ProxyRequest,
    url: &str,
) -> Result<(u16, Vec<(String, String)>, Bytes), String> {
    let method =
        reqwest::Method::from_bytes(req.method.as_bytes()).unwrap_or(reqwest::Method::GET);

    let mut builder = client.request(method, url).body(req.body.clone());

    for (name, value) in &req.headers {
        let lower = name.to_lowercase();
        if SKIPPED_REQUEST_HEADER_PREFIXES
            .iter()
            .any(|p| lower.starts_with(p))
        {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_str(name),
            HeaderValue::from_str(value),
        ) {
            builder = builder.header(name, value);
        }
    }

    builder = builder
        .header("X-Forwarded-For", req.remote_addr.clone())
        .header("X-Forwarded-Proto", req.scheme.clone())
        .header("X-Forwarded-Host", req.host.clone());

    let response = builder.send().await.map_err(|e| e.to_string())?;

    let status = response.status().as_u16();
    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();
    let body = response.bytes().await.map_err(|e| e.to_string())?;

    if status >= 500 {
        return Err(format!("upstream returned status {}", status));
    }

    Ok((status, headers, body))
}

fn join_url(base_url: &str, path_and_query: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path_and_query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_preserves_backend_path_prefix() {
        assert_eq!(
            join_url("http://host/api", "/users/1?x=1"),
            "http://host/api/users/1?x=1"
        );
    }

    #[test]
    fn join_url_trims_trailing_slash_on_base() {
        assert_eq!(join_url("http://host/", "/users"), "http://host/users");
    }

    #[tokio::test]
    async fn serve_returns_backend_unavailable_when_missing() {
        let registry = std::sync::Arc::new(BackendRegistry::new(reqwest::Client::new()));
        let breakers = std::sync::Arc::new(CircuitBreakerManager::new(
            super::super::circuit_breaker::CircuitBreakerConfig::default(),
        ));
        let engine = ProxyEngine::new(registry, breakers, None);
        let req = ProxyRequest {
            method: "GET".into(),
            path_and_query: "/x".into(),
            headers: vec![],
            body: Bytes::new(),
            remote_addr: "127.0.0.1".into(),
            scheme: "http".into(),
            host: "gateway".into(),
        };
        let err = engine.serve(req, "missing", Duration::from_secs(0)).await;
        assert!(matches!(err, Err(GatewayError::BackendUnavailable { .. })));
    }
}
