//! # Kairos Gateway Core
//!
//! A horizontally-deployable HTTP reverse-proxy / API gateway core built
//! with Rust and Actix Web. Terminates client connections, resolves a
//! request against a static route table, and forwards it to one of a set
//! of named backends — guarded by per-route authentication, rate
//! limiting, response caching, and circuit breaking.
//!
//! ## Core Features
//!
//! ### Routing
//! - Three path-pattern forms evaluated in config-declaration order:
//!   exact, prefix (`*`), and named-parameter (`:id`).
//! - Per-route auth mode (`none`, `jwt`, `api_key`, `optional_auth`),
//!   rate-limit override, and cache TTL.
//!
//! ### Resilience
//! - Token-bucket rate limiting over a pluggable KV Store (in-memory or a
//!   remote adapter).
//! - Three-state circuit breaker per backend (closed/open/half-open).
//! - Two-tier response cache (in-process L1, optional remote L2).
//! - Background health probing of registered backends.
//!
//! ### Observability
//! - Structured JSON or human-readable request logging with correlation
//!   IDs.
//! - Prometheus text-format metrics: request counts/latency, rate-limit
//!   hits, cache hits, circuit breaker state.
//! - Health, readiness, and liveness endpoints.
//!
//! ## Module Organization
//!
//! - **[`config`]** - Settings loading and comprehensive validation
//! - **[`models`]** - Route, backend, credential, and error types
//! - **[`services`]** - KV store, cache, rate limiter, circuit breaker,
//!   backend registry, and proxy engine
//! - **[`routes`]** - Health, metrics, and the terminal proxy handler
//! - **[`middleware`]** - The ordered request pipeline
//! - **[`context`]** - The request-scoped context threaded through it
//! - **[`state`]** - The shared `AppState` bundling every collaborator
//! - **[`utils`]** - Route matching
//! - **[`logs`]** - Logger configuration and structured log formatting
//!
//! ## Environment Variables
//!
//! - `KAIROS_CONFIG_PATH`: Configuration file path (default: `./config.json`)
//! - `KAIROS_HOST`: Server bind address (default: `0.0.0.0`)
//! - `KAIROS_PORT`: Server port (default: `5900`)
//! - `NO_COLOR`: Disable colored log output

pub mod config;
pub mod context;
pub mod logs;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
