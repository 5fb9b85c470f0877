//! Rate limit middleware (spec §4.7.9). Resolves the client identity
//! (authenticated user id, else `X-Client-Id`, else remote peer address),
//! consults the token bucket for the matched route, and either lets the
//! request through with `X-RateLimit-*` headers attached or short-circuits
//! with 429.

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use actix_web::error::ResponseError;
use futures_util::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::context::context_of;
use crate::middleware::route_resolve::resolve;
use crate::models::error::GatewayError;
use crate::routes::metrics::MetricsCollector;
use crate::services::rate_limiter::{AllowDecision, RateLimiter};
use crate::utils::route_matcher::RouteMatcher;

/// Merges the credential's capacity-only override with the matched route's
/// full `(capacity, refill_rate)` override, if any, falling back to the
/// limiter's own default refill rate when the credential supplies a
/// capacity but the route supplies no rate of its own. The credential never
/// contributes a refill rate — `apikey:<key>` records carry one
/// `rate_limit` number (spec §6), not a rate too.
fn merge_rate_limit_override(
    credential_capacity: Option<u64>,
    route_override: Option<(u64, u64)>,
    default_refill_rate: u64,
) -> Option<(u64, u64)> {
    match (credential_capacity, route_override) {
        (Some(capacity), Some((_, rate))) => Some((capacity, rate)),
        (Some(capacity), None) => Some((capacity, default_refill_rate)),
        (None, route_override) => route_override,
    }
}

fn resolve_client_id(req: &ServiceRequest, user_id: Option<&str>) -> String {
    if let Some(uid) = user_id {
        return uid.to_string();
    }
    if let Some(header) = req
        .headers()
        .get("X-Client-Id")
        .and_then(|v| v.to_str().ok())
    {
        if !header.is_empty() {
            return header.to_string();
        }
    }
    req.connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string()
}

#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
    matcher: Arc<RouteMatcher>,
    metrics: Arc<MetricsCollector>,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>, matcher: Arc<RouteMatcher>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            limiter,
            matcher,
            metrics,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = RateLimitMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RateLimitMiddleware {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            matcher: self.matcher.clone(),
            metrics: self.metrics.clone(),
        })
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
    matcher: Arc<RouteMatcher>,
    metrics: Arc<MetricsCollector>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let limiter = self.limiter.clone();
        let metrics = self.metrics.clone();
        let ctx = resolve(&req, &self.matcher);

        let (route_path, override_pair) = {
            let borrowed = ctx.borrow();
            let route_path = borrowed
                .matched_route
                .as_ref()
                .map(|m| m.route_path.clone())
                .unwrap_or_else(|| req.path().to_string());
            let route_override = borrowed
                .matched_route
                .as_ref()
                .and_then(|m| m.rate_limit_override);
            let override_pair =
                merge_rate_limit_override(borrowed.rate_limit_override, route_override, limiter.refill_rate());
            (route_path, override_pair)
        };
        let user_id = ctx.borrow().user_id.clone();
        let client_id = resolve_client_id(&req, user_id.as_deref());

        let http_req = req.request().clone();
        let service = self.service.clone();

        Box::pin(async move {
            let capacity = override_pair.map(|(cap, _)| cap).unwrap_or_else(|| limiter.capacity());
            let decision = match override_pair {
                Some((cap, rate)) => limiter.allow_override(&client_id, &route_path, cap, rate).await,
                None => limiter.allow(&client_id, &route_path).await,
            };

            match decision {
                AllowDecision::Allow { .. } => {
                    let res = service.call(req).await?;
                    let mut res = res.map_into_boxed_body();
                    let headers = res.headers_mut();
                    if let Ok(v) = actix_web::http::header::HeaderValue::from_str(&capacity.to_string()) {
                        headers.insert(
                            actix_web::http::header::HeaderName::from_static("x-ratelimit-limit"),
                            v,
                        );
                    }
                    Ok(res)
                }
                AllowDecision::Deny => {
                    metrics.record_rate_limit_hit(&client_id, &route_path);

                    let err = GatewayError::RateLimited { retry_after_secs: 60 };
                    let mut resp = err.error_response();
                    let headers = resp.headers_mut();
                    if let Ok(v) = actix_web::http::header::HeaderValue::from_str(&capacity.to_string()) {
                        headers.insert(
                            actix_web::http::header::HeaderName::from_static("x-ratelimit-limit"),
                            v,
                        );
                    }
                    headers.insert(
                        actix_web::http::header::HeaderName::from_static("x-ratelimit-remaining"),
                        actix_web::http::header::HeaderValue::from_static("0"),
                    );
                    let reset_at = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .expect("system clock before unix epoch")
                        .as_secs()
                        + 60;
                    if let Ok(v) = actix_web::http::header::HeaderValue::from_str(&reset_at.to_string()) {
                        headers.insert(
                            actix_web::http::header::HeaderName::from_static("x-ratelimit-reset"),
                            v,
                        );
                    }
                    Ok(ServiceResponse::new(http_req, resp).map_into_boxed_body())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::route::{AuthMode, RouteSpec};
    use crate::services::kv_store::MemoryStore;
    use actix_web::{test, web, App, HttpResponse};
    use std::time::Duration;

    async fn handler() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    fn matcher() -> Arc<RouteMatcher> {
        let spec = RouteSpec {
            path: "/x".to_string(),
            backend: "b".to_string(),
            methods: vec!["GET".to_string()],
            rate_limit: None,
            cache_ttl: None,
            auth: AuthMode::None,
        };
        Arc::new(RouteMatcher::new(vec![crate::models::route::Route::from_spec(spec)]))
    }

    #[actix_web::test]
    async fn allows_until_capacity_then_denies() {
        let limiter = Arc::new(RateLimiter::new(MemoryStore::new(), 1, 1, Duration::from_secs(60)));
        let metrics = Arc::new(MetricsCollector::new());
        let app = test::init_service(
            App::new()
                .wrap(RateLimit::new(limiter, matcher(), metrics))
                .route("/x", web::get().to(handler)),
        )
        .await;

        let req1 = test::TestRequest::get().uri("/x").to_request();
        let resp1 = test::call_service(&app, req1).await;
        assert_eq!(resp1.status(), 200);
        assert!(resp1.headers().get("x-ratelimit-limit").is_some());

        let req2 = test::TestRequest::get().uri("/x").to_request();
        let resp2 = test::call_service(&app, req2).await;
        assert_eq!(resp2.status(), 429);
    }

    #[test]
    fn credential_capacity_pairs_with_the_limiters_default_rate() {
        assert_eq!(
            merge_rate_limit_override(Some(10), None, 3),
            Some((10, 3))
        );
    }

    #[test]
    fn credential_capacity_overrides_only_the_routes_capacity() {
        assert_eq!(
            merge_rate_limit_override(Some(10), Some((5, 7)), 3),
            Some((10, 7))
        );
    }

    #[test]
    fn route_override_wins_when_no_credential_override_present() {
        assert_eq!(merge_rate_limit_override(None, Some((5, 7)), 3), Some((5, 7)));
    }

    #[test]
    fn no_override_anywhere_falls_back_to_the_limiters_own_defaults() {
        assert_eq!(merge_rate_limit_override(None, None, 3), None);
    }
}
