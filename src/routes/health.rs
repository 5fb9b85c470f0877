//! Health surface (spec §6): liveness/readiness aliases plus a detailed
//! view of backend and circuit breaker state for operators.

use actix_web::{web, HttpResponse, Result};
use serde_json::json;

use crate::state::AppState;

async fn health_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "healthy",
        "version": AppState::service_version(),
        "service": AppState::service_name(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

async fn readiness_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let backends = state.registry.get_all().await;
    let all_ready = backends.is_empty() || backends.iter().any(|b| b.is_healthy());
    if all_ready {
        return Ok(HttpResponse::Ok().json(json!({
            "status": "ready",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })));
    }
    Ok(HttpResponse::ServiceUnavailable().json(json!({
        "status": "not ready",
        "reason": "no healthy backends",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

async fn liveness_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "alive",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

async fn detailed_health(state: web::Data<AppState>) -> Result<HttpResponse> {
    let backends = state.registry.get_all().await;
    let backend_map: serde_json::Map<String, serde_json::Value> = backends
        .iter()
        .map(|b| (b.name.clone(), json!(if b.is_healthy() { "healthy" } else { "unhealthy" })))
        .collect();

    let breaker_states = state.breakers.all_states().await;
    let breaker_map: serde_json::Map<String, serde_json::Value> = breaker_states
        .iter()
        .map(|(name, state)| {
            let label = match state {
                crate::services::circuit_breaker::CircuitState::Closed => "closed",
                crate::services::circuit_breaker::CircuitState::Open => "open",
                crate::services::circuit_breaker::CircuitState::HalfOpen => "half_open",
            };
            (name.clone(), json!(label))
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "status": "healthy",
        "version": AppState::service_version(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "backends": backend_map,
        "circuit_breakers": breaker_map,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

pub fn configure_health(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/healthz", web::get().to(health_check))
        .route("/health/check", web::get().to(health_check))
        .route("/ready", web::get().to(readiness_check))
        .route("/readiness", web::get().to(readiness_check))
        .route("/live", web::get().to(liveness_check))
        .route("/liveness", web::get().to(liveness_check))
        .route("/health/detailed", web::get().to(detailed_health));
}
