//! Request metrics middleware (spec §4.7.7): records one
//! `requests_total` increment and one `request_duration_seconds`
//! observation per request into the shared [`MetricsCollector`], labeled
//! by method, matched route path (not the raw path, to keep parameterized
//! routes like `/api/users/:id` from exploding label cardinality),
//! status, and backend.

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use crate::context::context_of;
use crate::routes::metrics::MetricsCollector;

#[derive(Clone)]
pub struct RequestMetrics {
    metrics: Arc<MetricsCollector>,
}

impl RequestMetrics {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self { metrics }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestMetrics
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = RequestMetricsMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequestMetricsMiddleware {
            service: Rc::new(service),
            metrics: self.metrics.clone(),
        })
    }
}

pub struct RequestMetricsMiddleware<S> {
    service: Rc<S>,
    metrics: Arc<MetricsCollector>,
}

impl<S, B> Service<ServiceRequest> for RequestMetricsMiddleware<S>
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
        let service = self.service.clone();
        let metrics = self.metrics.clone();
        let started = Instant::now();
        let method = req.method().to_string();
        let raw_path = req.path().to_string();

        Box::pin(async move {
            let ctx = context_of(&req);
            let res = service.call(req).await?;
            let res = res.map_into_boxed_body();

            let duration = started.elapsed().as_secs_f64();
            let status = res.status().as_u16();
            let borrowed = ctx.borrow();
            let path = borrowed
                .route_path
                .clone()
                .or_else(|| borrowed.matched_route.as_ref().map(|m| m.route_path.clone()))
                .unwrap_or(raw_path);
            let backend = borrowed.backend.clone().unwrap_or_else(|| "unknown".to_string());
            drop(borrowed);

            metrics.record_request(&method, &path, status, &backend, duration);

            Ok(res)
        })
    }
}
