//! Prometheus text-format metrics for the gateway core (spec §6, §11).
//!
//! `MetricsCollector` is the single shared sink every pipeline middleware
//! records into: request counts, durations, rate-limit hits, cache hits, and
//! (via [`BreakerMetricsSink`]) circuit breaker state transitions. Exposing
//! it over HTTP is thin glue — the counters themselves are the product.

use actix_web::{web, HttpResponse, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::services::circuit_breaker::{BreakerMetricsSink, CircuitState};

#[derive(Default)]
struct Counter {
    value: AtomicU64,
}

impl Counter {
    fn incr(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Labeled request counter: `requests_total{method,path,status,backend}`.
#[derive(Default)]
struct LabeledCounters {
    counts: Mutex<HashMap<(String, String, String, String), u64>>,
}

impl LabeledCounters {
    fn incr(&self, labels: (String, String, String, String)) {
        let mut guard = self.counts.lock().expect("metrics mutex poisoned");
        *guard.entry(labels).or_insert(0) += 1;
    }

    fn render(&self, name: &str) -> String {
        let guard = self.counts.lock().expect("metrics mutex poisoned");
        let mut out = String::new();
        for ((method, path, status, backend), count) in guard.iter() {
            out.push_str(&format!(
                "{}{{method=\"{}\",path=\"{}\",status=\"{}\",backend=\"{}\"}} {}\n",
                name, method, path, status, backend, count
            ));
        }
        out
    }
}

#[derive(Default)]
struct DurationHistogram {
    sum_ms: Mutex<HashMap<(String, String), (f64, u64)>>,
}

impl DurationHistogram {
    fn observe(&self, method: String, path: String, secs: f64) {
        let mut guard = self.sum_ms.lock().expect("metrics mutex poisoned");
        let entry = guard.entry((method, path)).or_insert((0.0, 0));
        entry.0 += secs;
        entry.1 += 1;
    }

    fn render(&self, name: &str) -> String {
        let guard = self.sum_ms.lock().expect("metrics mutex poisoned");
        let mut out = String::new();
        for ((method, path), (sum, count)) in guard.iter() {
            out.push_str(&format!(
                "{}_sum{{method=\"{}\",path=\"{}\"}} {:.6}\n",
                name, method, path, sum
            ));
            out.push_str(&format!(
                "{}_count{{method=\"{}\",path=\"{}\"}} {}\n",
                name, method, path, count
            ));
        }
        out
    }
}

#[derive(Default)]
struct PairCounters {
    counts: Mutex<HashMap<(String, String), u64>>,
}

impl PairCounters {
    fn incr(&self, a: String, b: String) {
        let mut guard = self.counts.lock().expect("metrics mutex poisoned");
        *guard.entry((a, b)).or_insert(0) += 1;
    }

    fn render(&self, name: &str, label_a: &str, label_b: &str) -> String {
        let guard = self.counts.lock().expect("metrics mutex poisoned");
        let mut out = String::new();
        for ((a, b), count) in guard.iter() {
            out.push_str(&format!(
                "{}{{{}=\"{}\",{}=\"{}\"}} {}\n",
                name, label_a, a, label_b, b, count
            ));
        }
        out
    }
}

/// Central metrics sink, shared across the pipeline via `AppState`.
pub struct MetricsCollector {
    requests_total: LabeledCounters,
    request_duration_seconds: DurationHistogram,
    rate_limit_hits_total: PairCounters,
    cache_hits_total: PairCounters,
    circuit_breaker_state: Mutex<HashMap<String, CircuitState>>,
    legacy_requests: Counter,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            requests_total: LabeledCounters::default(),
            request_duration_seconds: DurationHistogram::default(),
            rate_limit_hits_total: PairCounters::default(),
            cache_hits_total: PairCounters::default(),
            circuit_breaker_state: Mutex::new(HashMap::new()),
            legacy_requests: Counter::default(),
            start_time: Instant::now(),
        }
    }
}

fn sanitize(value: &str, empty_default: &str) -> String {
    if value.is_empty() {
        empty_default.to_string()
    } else {
        value.to_string()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed request. `method`/`backend` fall back to
    /// `"unknown"` and `path`/`status` fall back to `"/"`/`"0"` when empty,
    /// per spec.
    pub fn record_request(
        &self,
        method: &str,
        path: &str,
        status: u16,
        backend: &str,
        duration_secs: f64,
    ) {
        let method = sanitize(method, "unknown");
        let path = sanitize(path, "/");
        let status = if status == 0 {
            "0".to_string()
        } else {
            status.to_string()
        };
        let backend = sanitize(backend, "unknown");

        self.requests_total
            .incr((method.clone(), path.clone(), status, backend));
        self.request_duration_seconds
            .observe(method, path, duration_secs);
        self.legacy_requests.incr();
    }

    pub fn record_rate_limit_hit(&self, client_id: &str, path: &str) {
        self.rate_limit_hits_total
            .incr(client_id.to_string(), path.to_string());
    }

    pub fn record_cache_hit(&self, cache_type: &str, hit_type: &str) {
        self.cache_hits_total
            .incr(cache_type.to_string(), hit_type.to_string());
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn requests_total_legacy(&self) -> u64 {
        self.legacy_requests.get()
    }

    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP requests_total Total requests handled, labeled by method/path/status/backend\n");
        out.push_str("# TYPE requests_total counter\n");
        out.push_str(&self.requests_total.render("requests_total"));
        out.push('\n');

        out.push_str("# HELP request_duration_seconds Request duration in seconds\n");
        out.push_str("# TYPE request_duration_seconds summary\n");
        out.push_str(
            &self
                .request_duration_seconds
                .render("request_duration_seconds"),
        );
        out.push('\n');

        out.push_str("# HELP rate_limit_hits_total Rate-limit decisions, labeled by client_id/path\n");
        out.push_str("# TYPE rate_limit_hits_total counter\n");
        out.push_str(
            &self
                .rate_limit_hits_total
                .render("rate_limit_hits_total", "client_id", "path"),
        );
        out.push('\n');

        out.push_str("# HELP cache_hits_total Cache lookups, labeled by cache_type/hit_type\n");
        out.push_str("# TYPE cache_hits_total counter\n");
        out.push_str(
            &self
                .cache_hits_total
                .render("cache_hits_total", "cache_type", "hit_type"),
        );
        out.push('\n');

        out.push_str("# HELP circuit_breaker_state Current circuit breaker state (0=closed,1=open,2=half_open)\n");
        out.push_str("# TYPE circuit_breaker_state gauge\n");
        {
            let guard = self
                .circuit_breaker_state
                .lock()
                .expect("metrics mutex poisoned");
            for (backend, state) in guard.iter() {
                out.push_str(&format!(
                    "circuit_breaker_state{{backend=\"{}\"}} {}\n",
                    backend,
                    state.as_metric_value()
                ));
            }
        }
        out.push('\n');

        out.push_str("# HELP process_uptime_seconds Seconds since process start\n");
        out.push_str("# TYPE process_uptime_seconds counter\n");
        out.push_str(&format!("process_uptime_seconds {}\n", self.uptime_secs()));

        out
    }
}

impl BreakerMetricsSink for MetricsCollector {
    fn set_circuit_state(&self, backend: &str, state: CircuitState) {
        self.circuit_breaker_state
            .lock()
            .expect("metrics mutex poisoned")
            .insert(backend.to_string(), state);
    }
}

/// Prometheus-text `/metrics` handler — thin glue over `MetricsCollector`.
pub async fn metrics_endpoint(metrics: web::Data<std::sync::Arc<MetricsCollector>>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4; charset=utf-8")
        .body(metrics.render_prometheus()))
}

pub fn configure_metrics(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics_endpoint));
}
