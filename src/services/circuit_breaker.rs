//! Per-backend circuit breaker and the manager that owns the breaker fleet.
//!
//! Three states — CLOSED, OPEN, HALF_OPEN — coordinated by a single
//! `tokio::sync::Mutex` per breaker. Unlike a purely atomic design, the
//! guarded operation itself runs while the mutex is held: this is a
//! per-backend breaker, not a per-request one, and callers are expected to
//! size their breaker granularity accordingly. Holding the lock across the
//! call serializes access to a backend through its breaker and makes the
//! HALF_OPEN probe count trivially correct — no separate concurrent-
//! admission tracking is needed because only one probe is ever in flight.

use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_metric_value(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub half_open_max: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_max: 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerConfigError {
    #[error("failure_threshold must be greater than zero")]
    NonPositiveFailureThreshold,
    #[error("recovery_timeout must be greater than zero")]
    NonPositiveRecoveryTimeout,
    #[error("half_open_max must be greater than zero")]
    NonPositiveHalfOpenMax,
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), CircuitBreakerConfigError> {
        if self.failure_threshold == 0 {
            return Err(CircuitBreakerConfigError::NonPositiveFailureThreshold);
        }
        if self.recovery_timeout.is_zero() {
            return Err(CircuitBreakerConfigError::NonPositiveRecoveryTimeout);
        }
        if self.half_open_max == 0 {
            return Err(CircuitBreakerConfigError::NonPositiveHalfOpenMax);
        }
        Ok(())
    }
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
}

/// Publishes `circuit_breaker_state(backend)` on every transition. Kept as
/// a trait so the breaker doesn't depend on the concrete metrics collector
/// type.
pub trait BreakerMetricsSink: Send + Sync {
    fn set_circuit_state(&self, backend: &str, state: CircuitState);
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    metrics: Option<Arc<dyn BreakerMetricsSink>>,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("operation failed: {0}")]
    OperationFailed(E),
}

impl CircuitBreaker {
    pub fn new(
        name: String,
        config: CircuitBreakerConfig,
    ) -> Result<Arc<Self>, CircuitBreakerConfigError> {
        Self::with_metrics(name, config, None)
    }

    pub fn with_metrics(
        name: String,
        config: CircuitBreakerConfig,
        metrics: Option<Arc<dyn BreakerMetricsSink>>,
    ) -> Result<Arc<Self>, CircuitBreakerConfigError> {
        config.validate()?;
        Ok(Arc::new(Self {
            name,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
            }),
            metrics,
        }))
    }

    fn publish(&self, state: CircuitState) {
        if let Some(sink) = &self.metrics {
            sink.set_circuit_state(&self.name, state);
        }
    }

    /// The sole public operation. Admits, runs `op`, and records the
    /// outcome, all under one mutex held for the operation's full
    /// duration.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut guard = self.inner.lock().await;

        match guard.state {
            CircuitState::Open => {
                let elapsed_ok = guard
                    .last_failure_time
                    .map(|t| t.elapsed() > self.config.recovery_timeout)
                    .unwrap_or(false);
                if elapsed_ok {
                    guard.state = CircuitState::HalfOpen;
                    guard.success_count = 0;
                    info!("circuit breaker {} transitioned to half-open", self.name);
                    self.publish(CircuitState::HalfOpen);
                } else {
                    return Err(CircuitBreakerError::CircuitOpen);
                }
            }
            CircuitState::Closed | CircuitState::HalfOpen => {}
        }

        let result = op().await;

        match &result {
            Ok(_) => self.on_success(&mut guard),
            Err(_) => self.on_failure(&mut guard),
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    fn on_success(&self, guard: &mut BreakerState) {
        if guard.state == CircuitState::HalfOpen {
            guard.success_count += 1;
            if guard.success_count >= self.config.half_open_max {
                guard.state = CircuitState::Closed;
                guard.failure_count = 0;
                guard.success_count = 0;
                info!("circuit breaker {} closed", self.name);
                self.publish(CircuitState::Closed);
            }
        }
    }

    fn on_failure(&self, guard: &mut BreakerState) {
        guard.last_failure_time = Some(Instant::now());
        match guard.state {
            CircuitState::Closed => {
                guard.failure_count += 1;
                if guard.failure_count >= self.config.failure_threshold {
                    guard.state = CircuitState::Open;
                    warn!("circuit breaker {} opened", self.name);
                    self.publish(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                guard.state = CircuitState::Open;
                guard.failure_count = self.config.failure_threshold;
                warn!("circuit breaker {} re-opened from half-open probe failure", self.name);
                self.publish(CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    pub async fn failure_count(&self) -> u32 {
        self.inner.lock().await.failure_count
    }

    /// Administrative override: clears counters and forces CLOSED.
    pub async fn reset(&self) {
        let mut guard = self.inner.lock().await;
        guard.state = CircuitState::Closed;
        guard.failure_count = 0;
        guard.success_count = 0;
        guard.last_failure_time = None;
        self.publish(CircuitState::Closed);
    }

    /// Administrative override: forces an arbitrary state and clears
    /// counters accordingly.
    pub async fn set_state(&self, state: CircuitState) {
        let mut guard = self.inner.lock().await;
        guard.state = state;
        guard.success_count = 0;
        match state {
            CircuitState::Closed => guard.failure_count = 0,
            CircuitState::Open => {
                guard.failure_count = self.config.failure_threshold;
                guard.last_failure_time = Some(Instant::now());
            }
            CircuitState::HalfOpen => {}
        }
        self.publish(state);
    }
}

/// Owns breakers in a map keyed by backend name. `get_or_create` uses
/// double-checked creation (read lock, then write lock) so concurrent
/// first-requests for the same backend never construct two breakers;
/// whichever config wins the race stays for the process lifetime.
pub struct CircuitBreakerManager {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    default_config: CircuitBreakerConfig,
    metrics: Option<Arc<dyn BreakerMetricsSink>>,
}

impl CircuitBreakerManager {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            default_config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn BreakerMetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn get_or_create(&self, backend_name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().await.get(backend_name) {
            return existing.clone();
        }
        let mut write_guard = self.breakers.write().await;
        if let Some(existing) = write_guard.get(backend_name) {
            return existing.clone();
        }
        let breaker = CircuitBreaker::with_metrics(
            backend_name.to_string(),
            self.default_config.clone(),
            self.metrics.clone(),
        )
        .expect("default circuit breaker config is always valid");
        write_guard.insert(backend_name.to_string(), breaker.clone());
        breaker
    }

    pub async fn get(&self, backend_name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().await.get(backend_name).cloned()
    }

    pub async fn all_states(&self) -> HashMap<String, CircuitState> {
        let guard = self.breakers.read().await;
        let mut out = HashMap::with_capacity(guard.len());
        for (name, breaker) in guard.iter() {
            out.insert(name.clone(), breaker.state().await);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failure_threshold: u32, half_open_max: u32, recovery_timeout: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout,
            half_open_max,
        }
    }

    #[tokio::test]
    async fn starts_closed_and_stays_closed_on_success() {
        let cb = CircuitBreaker::new("svc".into(), config(3, 1, Duration::from_secs(1))).unwrap();
        let result = cb.call(|| async { Ok::<i32, &str>(1) }).await;
        assert!(result.is_ok());
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_after_failure_threshold_and_fails_fast() {
        let cb = CircuitBreaker::new("svc".into(), config(2, 1, Duration::from_secs(60))).unwrap();
        let _ = cb.call(|| async { Err::<i32, &str>("e") }).await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        let _ = cb.call(|| async { Err::<i32, &str>("e") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        let result = cb.call(|| async { Ok::<i32, &str>(1) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen)));
    }

    #[tokio::test]
    async fn half_open_failure_rearms_the_breaker() {
        let cb = CircuitBreaker::new("svc".into(), config(1, 3, Duration::from_millis(20))).unwrap();
        let _ = cb.call(|| async { Err::<i32, &str>("e") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = cb.call(|| async { Err::<i32, &str>("e") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert_eq!(cb.failure_count().await, 1);
    }

    #[tokio::test]
    async fn half_open_recovers_after_half_open_max_successes() {
        let cb = CircuitBreaker::new("svc".into(), config(1, 2, Duration::from_millis(20))).unwrap();
        let _ = cb.call(|| async { Err::<i32, &str>("e") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = cb.call(|| async { Ok::<i32, &str>(1) }).await;
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        let _ = cb.call(|| async { Ok::<i32, &str>(1) }).await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(cb.failure_count().await, 0);
    }

    #[tokio::test]
    async fn rejects_non_positive_config() {
        let err = CircuitBreaker::new("svc".into(), config(0, 1, Duration::from_secs(1)));
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn manager_double_checked_creation_is_idempotent() {
        let manager = CircuitBreakerManager::new(CircuitBreakerConfig::default());
        let a = manager.get_or_create("svc").await;
        let b = manager.get_or_create("svc").await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn reset_clears_state_and_counters() {
        let cb = CircuitBreaker::new("svc".into(), config(1, 1, Duration::from_secs(60))).unwrap();
        let _ = cb.call(|| async { Err::<i32, &str>("e") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);
        cb.reset().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(cb.failure_count().await, 0);
    }
}
