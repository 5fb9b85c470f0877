//! Correlation ID generation and extraction (spec §4.7.2).

use uuid::Uuid;

/// Correlation ID generation and extraction from inbound headers.
pub struct CorrelationId;

impl CorrelationId {
    /// Generates a new correlation ID.
    pub fn generate() -> String {
        Uuid::new_v4().to_string()
    }

    /// Looks for an existing id in, in order, `X-Correlation-ID`,
    /// `X-Request-ID`, `X-Trace-ID`; generates a fresh one if none is set.
    pub fn from_request(req: &actix_web::HttpRequest) -> String {
        let headers = req.headers();
        for header_name in &["x-correlation-id", "x-request-id", "x-trace-id"] {
            if let Some(header_value) = headers.get(*header_name) {
                if let Ok(id) = header_value.to_str() {
                    if !id.is_empty() {
                        return id.to_string();
                    }
                }
            }
        }
        Self::generate()
    }
}
