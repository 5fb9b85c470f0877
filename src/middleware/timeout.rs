//! Per-request deadline enforcement (spec §4.7.6). Clamps the configured
//! timeout into `[100ms, 5min]`, races the downstream service against it,
//! and returns `GatewayError::Timeout` on expiry rather than hanging the
//! connection open.

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use actix_web::error::ResponseError;
use futures_util::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::context::context_of;
use crate::models::error::GatewayError;

const MIN_TIMEOUT: Duration = Duration::from_millis(100);
const MAX_TIMEOUT: Duration = Duration::from_secs(300);

fn clamp_timeout(requested: Duration) -> Duration {
    requested.clamp(MIN_TIMEOUT, MAX_TIMEOUT)
}

fn format_duration(d: Duration) -> String {
    if d.as_millis() % 1000 == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

#[derive(Clone, Copy)]
pub struct RequestTimeout {
    timeout: Duration,
}

impl RequestTimeout {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: clamp_timeout(timeout),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestTimeout
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = RequestTimeoutMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequestTimeoutMiddleware {
            service: Rc::new(service),
            timeout: self.timeout,
        })
    }
}

pub struct RequestTimeoutMiddleware<S> {
    service: Rc<S>,
    timeout: Duration,
}

impl<S, B> Service<ServiceRequest> for RequestTimeoutMiddleware<S>
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
        let timeout = self.timeout;
        let deadline = Instant::now() + timeout;
        context_of(&req).borrow_mut().deadline = Some(deadline);

        let http_req = req.request().clone();

        Box::pin(async move {
            match tokio::time::timeout(timeout, service.call(req)).await {
                Ok(inner) => Ok(inner?.map_into_boxed_body()),
                Err(_) => {
                    let err = GatewayError::Timeout {
                        timeout: format_duration(timeout),
                    };
                    let resp = err.error_response();
                    Ok(ServiceResponse::new(http_req, resp).map_into_boxed_body())
                }
            }
        })
    }
}
