//! CORS middleware (spec §4.7.4): answers preflight `OPTIONS` requests
//! directly and stamps the configured `Access-Control-*` headers onto every
//! response, short-circuiting before auth/rate-limit/proxy ever run for a
//! preflight.

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::{header, Method},
    Error, HttpResponse,
};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;

use crate::state::CorsPolicy;

#[derive(Clone)]
pub struct Cors {
    policy: CorsPolicy,
}

impl Cors {
    pub fn new(policy: CorsPolicy) -> Self {
        Self { policy }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Cors
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = CorsMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(CorsMiddleware {
            service: Rc::new(service),
            policy: self.policy.clone(),
        })
    }
}

pub struct CorsMiddleware<S> {
    service: Rc<S>,
    policy: CorsPolicy,
}

/// Allow-all echoes `*`; allow-list echoes the request's own `Origin` back
/// only if it's a member, and omits the header entirely otherwise (the
/// standard way to tell the browser to block the response).
fn apply_cors_headers(
    resp: &mut ServiceResponse<impl MessageBody>,
    policy: &CorsPolicy,
    origin: Option<&str>,
) {
    let allow_origin = if policy.allow_all {
        Some("*".to_string())
    } else {
        origin
            .filter(|o| policy.allowed_origins.iter().any(|allowed| allowed == o))
            .map(|o| o.to_string())
    };

    let headers = resp.headers_mut();
    if let Some(allow_origin) = allow_origin {
        if let Ok(value) = header::HeaderValue::from_str(&allow_origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
    }
    headers.insert(
        header::HeaderName::from_static("access-control-allow-methods"),
        header::HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
    );
    headers.insert(
        header::HeaderName::from_static("access-control-allow-headers"),
        header::HeaderValue::from_static("Content-Type, Authorization, X-API-Key, X-Client-Id, X-Request-ID"),
    );
}

impl<S, B> Service<ServiceRequest> for CorsMiddleware<S>
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
        let policy = self.policy.clone();
        let origin = req
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if req.method() == Method::OPTIONS {
            let http_req = req.request().clone();
            let mut resp = ServiceResponse::new(http_req, HttpResponse::NoContent().finish())
                .map_into_boxed_body();
            apply_cors_headers(&mut resp, &policy, origin.as_deref());
            return Box::pin(async move { Ok(resp) });
        }

        let service = self.service.clone();
        Box::pin(async move {
            let res = service.call(req).await?;
            let mut res = res.map_into_boxed_body();
            apply_cors_headers(&mut res, &policy, origin.as_deref());
            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse as Resp};

    async fn handler() -> Resp {
        Resp::Ok().finish()
    }

    #[actix_web::test]
    async fn preflight_short_circuits_to_204() {
        let app = test::init_service(
            App::new()
                .wrap(Cors::new(CorsPolicy::default()))
                .route("/x", web::get().to(handler)),
        )
        .await;
        let req = test::TestRequest::with_uri("/x")
            .method(Method::OPTIONS)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 204);
        assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "*");
    }

    #[actix_web::test]
    async fn normal_requests_get_cors_headers_too() {
        let app = test::init_service(
            App::new()
                .wrap(Cors::new(CorsPolicy::default()))
                .route("/x", web::get().to(handler)),
        )
        .await;
        let req = test::TestRequest::get().uri("/x").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert!(resp.headers().get("access-control-allow-origin").is_some());
    }

    #[actix_web::test]
    async fn allow_list_echoes_a_listed_origin() {
        let policy = CorsPolicy::allow_list(vec!["https://trusted.example".to_string()]);
        let app = test::init_service(
            App::new()
                .wrap(Cors::new(policy))
                .route("/x", web::get().to(handler)),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/x")
            .insert_header(("Origin", "https://trusted.example"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "https://trusted.example"
        );
    }

    #[actix_web::test]
    async fn allow_list_omits_the_header_for_an_unlisted_origin() {
        let policy = CorsPolicy::allow_list(vec!["https://trusted.example".to_string()]);
        let app = test::init_service(
            App::new()
                .wrap(Cors::new(policy))
                .route("/x", web::get().to(handler)),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/x")
            .insert_header(("Origin", "https://evil.example"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.headers().get("access-control-allow-origin").is_none());
    }
}
