//! Shared route-resolution helper (spec §4.7.11, performed once per
//! request and cached in the [`RequestContext`] so the Auth and Rate
//! Limit middleware and the terminal proxy handler all agree on exactly
//! one match — matching the request path against a static route table is
//! pure and cheap, but re-running it independently in three places would
//! risk disagreement if the table were ever mutated mid-request).

use actix_web::dev::ServiceRequest;

use crate::context::{context_of, MatchedRouteInfo, RouteLookupFailure, SharedContext};
use crate::models::route::AuthMode;
use crate::utils::route_matcher::{RouteMatchError, RouteMatcher};

/// Resolves (or returns the already-cached) route match for this request.
/// Safe to call from any of Auth / RateLimit / the terminal handler in any
/// order — only the first caller actually runs the matcher.
pub fn resolve(req: &ServiceRequest, matcher: &RouteMatcher) -> SharedContext {
    let ctx = context_of(req);
    {
        let borrowed = ctx.borrow();
        if borrowed.matched_route.is_some() || borrowed.route_lookup_failure.is_some() {
            return ctx.clone();
        }
    }

    let method = req.method().as_str();
    let path = req.path();

    match matcher.find_match(method, path) {
        Ok(matched) => {
            let mut borrowed = ctx.borrow_mut();
            borrowed.matched_route = Some(MatchedRouteInfo {
                backend_name: matched.route.backend_name.clone(),
                cache_ttl_secs: matched.route.cache_ttl_secs,
                params: matched.params,
                route_path: matched.route.raw_path.clone(),
                rate_limit_override: matched
                    .route
                    .rate_limit_override
                    .as_ref()
                    .map(|o| (o.capacity, o.refill_rate)),
            });
        }
        Err(RouteMatchError::NoMatch { .. }) => {
            ctx.borrow_mut().route_lookup_failure = Some(RouteLookupFailure::NoMatch);
        }
        Err(RouteMatchError::MethodNotAllowed {
            allowed_methods, ..
        }) => {
            ctx.borrow_mut().route_lookup_failure =
                Some(RouteLookupFailure::MethodNotAllowed { allowed_methods });
        }
    }

    ctx
}

/// The auth mode declared by the matched route, or `None` (meaning: treat
/// as anonymous, don't block) when nothing matched — a missing route
/// surfaces as 404/405 from the terminal handler, not as a 401 from Auth.
pub fn matched_auth_mode(req: &ServiceRequest, matcher: &RouteMatcher) -> AuthMode {
    let ctx = resolve(req, matcher);
    let borrowed = ctx.borrow();
    let Some(matched) = &borrowed.matched_route else {
        return AuthMode::None;
    };
    matcher
        .routes()
        .iter()
        .find(|r| r.raw_path == matched.route_path && r.backend_name == matched.backend_name)
        .map(|r| r.auth)
        .unwrap_or(AuthMode::None)
}
