//! Request completion logging (spec §4.7.3): one structured line per
//! request, emitted after the response is known, carrying the fields
//! `StructuredLogEntry`'s JSON formatter expects downstream log
//! aggregation to key on.

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use log::{error, info, warn};
use serde_json::json;
use std::rc::Rc;
use std::time::Instant;

use crate::context::context_of;

pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = RequestLoggingMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequestLoggingMiddleware {
            service: Rc::new(service),
        })
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
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
        let started = Instant::now();

        let method = req.method().to_string();
        let path = req.path().to_string();
        let client_ip = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();
        let user_agent = req
            .headers()
            .get("User-Agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Box::pin(async move {
            let ctx = context_of(&req);
            let res = service.call(req).await?;
            let res = res.map_into_boxed_body();

            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            let status = res.status().as_u16();
            let borrowed = ctx.borrow();
            let user_id = borrowed.user_id.clone().unwrap_or_else(|| "anonymous".to_string());
            let auth_method = borrowed
                .auth_method
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "none".to_string());
            let backend = borrowed.backend.clone().unwrap_or_else(|| "unknown".to_string());
            let request_id = borrowed.request_id.clone();
            drop(borrowed);

            let entry = json!({
                "request_id": request_id,
                "method": method,
                "path": path,
                "status": status,
                "latency_ms": latency_ms,
                "client_ip": client_ip,
                "user_agent": user_agent,
                "user_id": user_id,
                "auth_method": auth_method,
                "backend": backend,
            });

            if status >= 500 {
                error!("request completed: {}", entry);
            } else if status >= 400 {
                warn!("request completed: {}", entry);
            } else {
                info!("request completed: {}", entry);
            }

            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    async fn handler() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    #[actix_web::test]
    async fn logs_and_passes_response_through() {
        let app = test::init_service(
            App::new()
                .wrap(RequestLogging)
                .route("/x", web::get().to(handler)),
        )
        .await;
        let req = test::TestRequest::get().uri("/x").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }
}
