//! Request pipeline middleware (spec §4.7): panic recovery, request id,
//! logging, CORS, security headers, timeout, metrics, auth, rate limit,
//! and content-type validation, composed in that order by `main.rs`.

pub mod auth;
pub mod content_type;
pub mod cors;
pub mod logging;
pub mod metrics;
pub mod panic_recovery;
pub mod rate_limit;
pub mod request_id;
pub mod route_resolve;
pub mod security;
pub mod timeout;
