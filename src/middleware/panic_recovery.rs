//! Panic recovery — the outermost layer of the pipeline (spec §4.7.1).
//!
//! Catches panics from any downstream middleware or handler so a bug in one
//! request never takes down the serving task for another.

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpResponse,
};
use futures_util::future::{ok, FutureExt, LocalBoxFuture, Ready};
use log::error;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;

use crate::context::context_of;

pub struct PanicRecovery;

impl<S, B> Transform<S, ServiceRequest> for PanicRecovery
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = PanicRecoveryMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(PanicRecoveryMiddleware {
            service: Rc::new(service),
        })
    }
}

pub struct PanicRecoveryMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for PanicRecoveryMiddleware<S>
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
        let http_req = req.request().clone();
        let ctx = context_of(&req);

        Box::pin(async move {
            match AssertUnwindSafe(service.call(req)).catch_unwind().await {
                Ok(result) => result.map(|res| res.map_into_boxed_body()),
                Err(panic) => {
                    // Read after the inner service has run (or panicked) so
                    // this sees the id `RequestId` assigned downstream, not
                    // the empty default from before it ran.
                    let request_id = ctx.borrow().request_id.clone();
                    error!(
                        "panic in request pipeline (request_id={}): {}",
                        request_id,
                        panic_message(&panic)
                    );
                    let response = HttpResponse::InternalServerError().json(json!({
                        "error": "internal server error",
                        "request_id": request_id,
                    }));
                    Ok(ServiceResponse::new(http_req, response).map_into_boxed_body())
                }
            }
        })
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
