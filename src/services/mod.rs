//! Service layer implementations for the gateway core.
//!
//! - [`kv_store`] — opaque string-keyed store with TTL and atomic increment.
//! - [`cache`] — two-tier response cache composing an in-process L1 with an
//!   optional remote-backed L2.
//! - [`rate_limiter`] — token bucket limiter over the KV Store.
//! - [`circuit_breaker`] — per-backend breaker state machine and manager.
//! - [`registry`] — backend registry and background health prober.
//! - [`http`] — the proxy engine: forwarding, header propagation, cache
//!   short-circuit, breaker wrapping.

pub mod cache;
pub mod circuit_breaker;
pub mod http;
pub mod kv_store;
pub mod rate_limiter;
pub mod registry;
