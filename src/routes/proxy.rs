//! Terminal route-match-and-proxy handler (spec §4.6, §6). Registered as
//! the app's default service so every path not claimed by the health or
//! metrics surfaces falls through here; the route match itself was
//! already resolved (and cached in the request context) by the Auth and
//! Rate Limit middleware earlier in the pipeline, so this handler only
//! needs to read the outcome back and either reject or forward.

use actix_web::{web, HttpRequest, HttpResponse};
use bytes::Bytes;
use std::time::Duration;

use crate::context::{RouteLookupFailure, SharedContext};
use crate::models::error::GatewayError;
use crate::services::http::{ProxyRequest, ProxyResponse};
use crate::state::AppState;

fn context_of_request(req: &HttpRequest) -> Option<SharedContext> {
    req.extensions().get::<SharedContext>().cloned()
}

pub async fn proxy_handler(
    req: HttpRequest,
    body: Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let ctx = context_of_request(&req).ok_or_else(|| {
        GatewayError::internal("request context missing from extensions")
    })?;

    let (matched, failure) = {
        let borrowed = ctx.borrow();
        (borrowed.matched_route.clone(), borrowed.route_lookup_failure.clone())
    };

    if let Some(failure) = failure {
        return Err(match failure {
            RouteLookupFailure::NoMatch => GatewayError::RouteNotFound {
                path: req.path().to_string(),
            },
            RouteLookupFailure::MethodNotAllowed { allowed_methods } => {
                GatewayError::MethodNotAllowed {
                    method: req.method().to_string(),
                    path: req.path().to_string(),
                    allowed_methods,
                }
            }
        });
    }

    let matched = matched.ok_or_else(|| {
        GatewayError::RouteNotFound {
            path: req.path().to_string(),
        }
    })?;

    let path_and_query = match req.uri().query() {
        Some(q) => format!("{}?{}", req.path(), q),
        None => req.path().to_string(),
    };

    let headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();

    let remote_addr = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();
    let scheme = req.connection_info().scheme().to_string();
    let host = req.connection_info().host().to_string();

    let proxy_request = ProxyRequest {
        method: req.method().to_string(),
        path_and_query,
        headers,
        body,
        remote_addr,
        scheme,
        host,
    };

    ctx.borrow_mut().backend = Some(matched.backend_name.clone());

    let ProxyResponse { status, headers, body } = state
        .proxy
        .serve(
            proxy_request,
            &matched.backend_name,
            Duration::from_secs(matched.cache_ttl_secs),
        )
        .await?;

    let mut builder = HttpResponse::build(
        actix_web::http::StatusCode::from_u16(status)
            .unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY),
    );
    for (name, value) in &headers {
        builder.insert_header((name.as_str(), value.as_str()));
    }
    Ok(builder.body(body))
}

pub fn configure_proxy(cfg: &mut web::ServiceConfig) {
    cfg.default_service(web::route().to(proxy_handler));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_path_and_query_with_query_string() {
        let uri: actix_web::http::Uri = "/api/x?y=1".parse().unwrap();
        assert_eq!(uri.query(), Some("y=1"));
    }
}
