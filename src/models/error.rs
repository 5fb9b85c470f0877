//! The single error type surfaced by every layer of the gateway core.
//!
//! Variants line up with the error-kind taxonomy in the design: client
//! input errors, timeouts, backend unavailability, breaker refusals, and
//! unclassified internal errors. Each carries exactly the fields callers
//! already construct it with elsewhere in the crate — no variant exists
//! that nothing builds.

use actix_web::HttpResponse;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("route not found: {path}")]
    RouteNotFound { path: String },

    #[error("method {method} not allowed on {path}")]
    MethodNotAllowed {
        method: String,
        path: String,
        allowed_methods: Vec<String>,
    },

    #[error("authentication failed: {reason}")]
    Unauthorized { reason: String },

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("unsupported content type: {content_type}")]
    UnsupportedMediaType { content_type: String },

    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("request timed out after {timeout}")]
    Timeout { timeout: String },

    #[error("backend unavailable: {message}")]
    BackendUnavailable { message: String },

    #[error("circuit breaker open for backend {backend}")]
    BreakerOpen { backend: String },

    #[error("internal error: {message}")]
    Internal {
        message: String,
        request_id: Option<String>,
    },
}

impl GatewayError {
    pub fn internal(message: impl Into<String>) -> Self {
        GatewayError::Internal {
            message: message.into(),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        if let GatewayError::Internal { request_id: rid, .. } = &mut self {
            *rid = Some(request_id);
        }
        self
    }
}

impl actix_web::error::ResponseError for GatewayError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden { .. } => StatusCode::FORBIDDEN,
            GatewayError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            GatewayError::BackendUnavailable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::BreakerOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            GatewayError::MethodNotAllowed {
                allowed_methods, ..
            } => json!({
                "error": self.to_string(),
                "allowed_methods": allowed_methods,
            }),
            GatewayError::RateLimited { retry_after_secs } => json!({
                "error": "Rate limit exceeded",
                "retry_after": format!("{} seconds", retry_after_secs),
            }),
            GatewayError::Timeout { timeout } => json!({
                "error": self.to_string(),
                "timeout": timeout,
            }),
            GatewayError::Internal { message, request_id } => json!({
                "error": message,
                "request_id": request_id,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        let mut builder = HttpResponse::build(self.status_code());
        if matches!(self, GatewayError::Timeout { .. }) {
            builder.insert_header(("Connection", "close"));
        }
        builder.json(body)
    }
}
