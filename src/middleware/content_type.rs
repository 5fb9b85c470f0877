//! Content-Type allow-list middleware (spec §4.7.10). Bodies on
//! state-changing methods (`POST`/`PUT`/`PATCH`) must declare a
//! `Content-Type` present in the configured allow-list; everything else
//! passes through untouched.

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    Error,
};
use actix_web::error::ResponseError;
use futures_util::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;

use crate::models::error::GatewayError;

const CHECKED_METHODS: &[Method] = &[Method::POST, Method::PUT, Method::PATCH];

fn base_media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}

#[derive(Clone)]
pub struct ContentTypeValidation {
    allowlist: Arc<Vec<String>>,
}

impl ContentTypeValidation {
    pub fn new(allowlist: Vec<String>) -> Self {
        Self {
            allowlist: Arc::new(allowlist),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ContentTypeValidation
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = ContentTypeValidationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ContentTypeValidationMiddleware {
            service: Rc::new(service),
            allowlist: self.allowlist.clone(),
        })
    }
}

pub struct ContentTypeValidationMiddleware<S> {
    service: Rc<S>,
    allowlist: Arc<Vec<String>>,
}

impl<S, B> Service<ServiceRequest> for ContentTypeValidationMiddleware<S>
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
        if self.allowlist.is_empty() || !CHECKED_METHODS.contains(req.method()) {
            let service = self.service.clone();
            return Box::pin(async move { Ok(service.call(req).await?.map_into_boxed_body()) });
        }

        let content_type = req
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let allowed = match &content_type {
            Some(ct) => self
                .allowlist
                .iter()
                .any(|allowed| allowed == base_media_type(ct)),
            None => false,
        };

        if allowed {
            let service = self.service.clone();
            Box::pin(async move { Ok(service.call(req).await?.map_into_boxed_body()) })
        } else {
            let http_req = req.request().clone();
            let err = GatewayError::UnsupportedMediaType {
                content_type: content_type.unwrap_or_else(|| "none".to_string()),
            };
            Box::pin(async move {
                Ok(ServiceResponse::new(http_req, err.error_response()).map_into_boxed_body())
            })
        }
    }
}
