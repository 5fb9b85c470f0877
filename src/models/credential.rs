//! Credential and request-scoped auth-context types (spec §3, §9).

/// An opaque-key or bearer-token value presented by the client, before
/// validation.
#[derive(Debug, Clone)]
pub enum Credential {
    Bearer(String),
    ApiKey(String),
}

/// The result of successfully validating a [`Credential`].
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub role: Option<String>,
    pub auth_method: AuthMethod,
    pub rate_limit_override: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Jwt,
    ApiKey,
    Anonymous,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Jwt => "jwt",
            AuthMethod::ApiKey => "api_key",
            AuthMethod::Anonymous => "anonymous",
        }
    }
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            role: None,
            auth_method: AuthMethod::Anonymous,
            rate_limit_override: None,
        }
    }
}
