//! Kairos Gateway Server
//!
//! High-performance HTTP reverse-proxy / API gateway built with Rust and
//! Actix Web. Wires up every collaborator (backend registry, circuit
//! breakers, cache, rate limiter, auth validators, metrics) into one
//! `AppState` and composes the ordered middleware pipeline around the
//! terminal route-match-and-proxy handler.

use kairos_gateway::config::settings::load_settings;
use kairos_gateway::config::validation::ConfigValidator;
use kairos_gateway::logs::logger::configure_logger;
use kairos_gateway::middleware::auth::{ApiKeyValidator, Auth, AuthConfig, BearerValidator};
use kairos_gateway::middleware::content_type::ContentTypeValidation;
use kairos_gateway::middleware::cors::Cors;
use kairos_gateway::middleware::logging::RequestLogging;
use kairos_gateway::middleware::metrics::RequestMetrics;
use kairos_gateway::middleware::panic_recovery::PanicRecovery;
use kairos_gateway::middleware::rate_limit::RateLimit;
use kairos_gateway::middleware::request_id::RequestId;
use kairos_gateway::middleware::security::SecurityHeaders;
use kairos_gateway::middleware::timeout::RequestTimeout;
use kairos_gateway::models::backend::Backend;
use kairos_gateway::models::route::Route;
use kairos_gateway::routes::{health, metrics as metrics_routes, proxy};
use kairos_gateway::services::cache::{CacheManager, L1Cache};
use kairos_gateway::services::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerManager};
use kairos_gateway::services::http::ProxyEngine;
use kairos_gateway::services::kv_store::MemoryStore;
use kairos_gateway::services::rate_limiter::RateLimiter;
use kairos_gateway::services::registry::BackendRegistry;
use kairos_gateway::state::{AppState, CorsPolicy};
use kairos_gateway::routes::metrics::MetricsCollector;
use kairos_gateway::utils::route_matcher::RouteMatcher;

use actix_web::{web, App, HttpServer};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;

const DEFAULT_CONTENT_TYPE_ALLOWLIST: &[&str] = &["application/json", "application/x-www-form-urlencoded"];

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    configure_logger();

    let settings = load_settings().expect("failed to load settings");

    info!(
        "starting kairos gateway v{} with {} backend(s) and {} route(s)",
        AppState::service_version(),
        settings.backends.len(),
        settings.routes.len()
    );

    let validation = ConfigValidator::validate_comprehensive(&settings);
    if !validation.is_valid {
        error!("configuration validation failed:");
        for err in &validation.errors {
            error!("  - {}", err);
        }
        std::process::exit(1);
    }
    info!(
        "configuration validated with {} warning(s)",
        validation.warnings.len()
    );

    let http_client = reqwest::Client::new();
    let registry = Arc::new(BackendRegistry::new(http_client));
    for spec in &settings.backends {
        match Backend::new(&spec.name, &spec.url, &spec.health_check, spec.weight) {
            Ok(backend) => registry.add(backend).await,
            Err(e) => {
                error!("skipping invalid backend '{}': {}", spec.name, e);
            }
        }
    }
    registry.start_health_checks(Duration::from_secs(30));

    let metrics = Arc::new(MetricsCollector::new());

    let breakers = Arc::new(
        CircuitBreakerManager::new(CircuitBreakerConfig {
            failure_threshold: settings.circuit.failure_threshold,
            recovery_timeout: Duration::from_secs(settings.circuit.recovery_timeout_secs),
            half_open_max: settings.circuit.max_requests,
        })
        .with_metrics(metrics.clone()),
    );

    // No concrete remote KV/cache backend ships with the core (spec.md §4.1
    // declares the contract, not an implementation) — the demo binary runs
    // entirely on the in-memory store regardless of `rate_limit.storage` /
    // `cache.remote` configuration.
    let kv_store = MemoryStore::new();
    if settings.rate_limit.storage == kairos_gateway::models::settings::RateLimitStorage::Remote {
        warn!("rate_limit.storage=remote requested but no remote backend is wired; using in-memory store");
    }
    if settings.cache.remote.is_some() {
        warn!("cache.remote configured but no remote backend is wired; using L1-only cache");
    }

    let l1 = L1Cache::new(settings.cache.memory.max_size, Duration::from_secs(settings.cache.memory.ttl_secs));
    let cache = Arc::new(CacheManager::new(l1, None));

    let proxy_engine = Arc::new(ProxyEngine::new(registry.clone(), breakers.clone(), Some(cache.clone())));

    let rate_limiter = Arc::new(RateLimiter::new(
        kv_store.clone(),
        settings.rate_limit.burst_capacity,
        settings.rate_limit.default_rate,
        Duration::from_secs(1),
    ));

    let routes: Vec<Route> = settings
        .routes
        .iter()
        .cloned()
        .map(Route::from_spec)
        .collect();
    let route_matcher = Arc::new(RouteMatcher::new(routes));

    let bearer_validator = settings
        .auth
        .jwt
        .as_ref()
        .map(|jwt| Arc::new(BearerValidator::new(jwt.secret.clone())));
    let api_key_validator = Arc::new(ApiKeyValidator::new(kv_store.clone()));
    let api_key_header = settings
        .auth
        .api_key
        .as_ref()
        .map(|k| k.header.clone())
        .unwrap_or_else(|| "X-API-Key".to_string());

    let content_type_allowlist: Vec<String> = DEFAULT_CONTENT_TYPE_ALLOWLIST
        .iter()
        .map(|s| s.to_string())
        .collect();

    let state = web::Data::new(AppState {
        settings: settings.clone(),
        route_matcher: route_matcher.clone(),
        registry: registry.clone(),
        breakers: breakers.clone(),
        cache: Some(cache.clone()),
        proxy: proxy_engine,
        rate_limiter: rate_limiter.clone(),
        kv_store: kv_store.clone(),
        metrics: metrics.clone(),
        bearer_validator: bearer_validator.clone(),
        api_key_validator: api_key_validator.clone(),
        cors: CorsPolicy::default(),
        content_type_allowlist: content_type_allowlist.clone(),
        started_at: Instant::now(),
    });

    let host = std::env::var("KAIROS_HOST").unwrap_or_else(|_| settings.server.host.clone());
    let port = std::env::var("KAIROS_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(settings.server.port);

    info!("binding server on {}:{}", host, port);

    let auth_config = AuthConfig {
        route_matcher: route_matcher.clone(),
        bearer: bearer_validator,
        api_key: api_key_validator,
        api_key_header,
    };
    let request_timeout = Duration::from_millis(settings.server.read_timeout_ms);
    let cors_policy = CorsPolicy::default();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::Data::new(metrics.clone()))
            .configure(health::configure_health)
            .configure(metrics_routes::configure_metrics)
            .configure(proxy::configure_proxy)
            .wrap(ContentTypeValidation::new(content_type_allowlist.clone()))
            .wrap(RateLimit::new(
                rate_limiter.clone(),
                route_matcher.clone(),
                metrics.clone(),
            ))
            .wrap(Auth::new(auth_config.clone()))
            .wrap(RequestMetrics::new(metrics.clone()))
            .wrap(RequestTimeout::new(request_timeout))
            .wrap(SecurityHeaders)
            .wrap(Cors::new(cors_policy.clone()))
            .wrap(RequestLogging)
            .wrap(RequestId)
            .wrap(PanicRecovery)
    })
    .bind((host.as_str(), port))?
    .run();

    info!("server started successfully");

    tokio::select! {
        result = server => {
            match result {
                Ok(_) => info!("server stopped gracefully"),
                Err(e) => error!("server error: {}", e),
            }
        }
        _ = signal::ctrl_c() => {
            info!("received shutdown signal, stopping server...");
        }
    }

    Ok(())
}
