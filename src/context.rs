//! Request-scoped context threaded through the pipeline (spec §9).
//!
//! Replaces hidden per-request globals with a single value carried via the
//! `ServiceRequest` extensions map: cancellation/deadline plus a typed
//! key/value bag (user id, role, auth method, rate limit, request id,
//! backend, route path). Middleware mutate it in place as the request
//! passes through; the final handler and the logging middleware read it
//! back out.

use actix_web::dev::ServiceRequest;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use crate::models::credential::AuthMethod;

/// A route match resolved ahead of the terminal proxy step, so the auth and
/// rate-limit middleware (which both need to know the matched route) and
/// the final route-match+proxy step agree on exactly one match per request.
#[derive(Debug, Clone)]
pub struct MatchedRouteInfo {
    pub backend_name: String,
    pub cache_ttl_secs: u64,
    pub params: Vec<(String, String)>,
    pub route_path: String,
    pub rate_limit_override: Option<(u64, u64)>,
}

/// Distinguishes "no route matches this path" from "a route matches but
/// rejects this method", computed once and read by the terminal handler.
#[derive(Debug, Clone)]
pub enum RouteLookupFailure {
    NoMatch,
    MethodNotAllowed { allowed_methods: Vec<String> },
}

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub auth_method: Option<AuthMethod>,
    /// Capacity-only override from the authenticated credential (spec §6's
    /// `apikey:<key>` record carries a single `rate_limit` field, not a
    /// capacity/refill-rate pair) — merged with the route's own refill rate
    /// by the rate-limit middleware, never a full `(capacity, rate)` pair
    /// on its own.
    pub rate_limit_override: Option<u64>,
    pub backend: Option<String>,
    pub route_path: Option<String>,
    pub matched_route: Option<MatchedRouteInfo>,
    pub route_lookup_failure: Option<RouteLookupFailure>,
    pub deadline: Option<Instant>,
}

pub type SharedContext = Rc<RefCell<RequestContext>>;

/// Fetches the context already attached to this request, or attaches and
/// returns a fresh one. Safe to call from any middleware in the chain
/// regardless of whether an earlier one has already run.
pub fn context_of(req: &ServiceRequest) -> SharedContext {
    if let Some(ctx) = req.extensions().get::<SharedContext>() {
        return ctx.clone();
    }
    let ctx: SharedContext = Rc::new(RefCell::new(RequestContext::default()));
    req.extensions_mut().insert(ctx.clone());
    ctx
}
