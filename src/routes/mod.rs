//! HTTP route handlers: health surface, metrics exposition, and the
//! terminal route-match-and-proxy handler.

pub mod health;
pub mod metrics;
pub mod proxy;
