//! Request ID middleware (spec §4.7.2): reads `X-Request-ID` or a
//! correlation header, generating a fresh one when absent, and echoes it
//! on the response.

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error,
};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::str::FromStr;

use crate::context::context_of;
use crate::logs::structured::CorrelationId;

pub struct RequestId;

impl<S, B> Transform<S, ServiceRequest> for RequestId
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = RequestIdMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequestIdMiddleware {
            service: Rc::new(service),
        })
    }
}

pub struct RequestIdMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestIdMiddleware<S>
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
        let id = CorrelationId::from_request(req.request());
        context_of(&req).borrow_mut().request_id = id.clone();

        Box::pin(async move {
            let res = service.call(req).await?;
            let mut res = res.map_into_boxed_body();
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_str("X-Request-ID"),
                HeaderValue::from_str(&id),
            ) {
                res.headers_mut().insert(name, value);
            }
            Ok(res)
        })
    }
}
