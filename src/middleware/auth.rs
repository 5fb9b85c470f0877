//! Auth validators and the Auth pipeline middleware (spec §4.7.8, §4.8).
//!
//! Two stateless validators — [`BearerValidator`] (JWT) and
//! [`ApiKeyValidator`] (opaque key looked up in the KV Store) — produce an
//! [`AuthContext`] from a raw [`Credential`]. The [`Auth`] middleware wraps
//! the downstream chain, resolves the route match (see
//! [`crate::middleware::route_resolve`]) to learn which of `Jwt` /
//! `ApiKey` / `OptionalAuth` / `None` applies, and runs the matching
//! validator, writing the result into the request-scoped context for the
//! rate limiter and request logger to read back out.

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpResponse,
};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::credential::{AuthContext, AuthMethod, Credential};
use crate::models::route::AuthMode;
use crate::services::kv_store::{KvError, KvStore};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credential")]
    Missing,
    #[error("malformed credential")]
    Malformed,
    #[error("token expired or not yet valid")]
    Expired,
    #[error("unsupported signing algorithm")]
    WrongAlgorithm,
    #[error("refresh tokens are not accepted at resource endpoints")]
    WrongTokenType,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("key not found")]
    NotFound,
    #[error("key disabled")]
    Disabled,
    #[error("key expired")]
    ApiKeyExpired,
    #[error("stored key record is corrupt")]
    ParseError,
    #[error("transport error: {0}")]
    Transport(String),
}

/// JWT claims this gateway issues and accepts. `token_type` distinguishes
/// access tokens (accepted here) from refresh tokens (always rejected at
/// a resource endpoint, per spec §4.8).
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    #[serde(default)]
    pub nbf: Option<usize>,
    #[serde(rename = "type")]
    pub token_type: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// `Validate(token) -> {user_id, role, type}`. Enforces the configured
/// symmetric HMAC algorithm (any other algorithm is rejected before
/// signature verification ever runs — `jsonwebtoken` checks the token's
/// header algorithm against `Validation`'s), standard `exp`/`nbf`/`iat`
/// checks, and the access/refresh `type` discrimination.
pub struct BearerValidator {
    secret: String,
}

impl BearerValidator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn validate(&self, token: &str) -> Result<AuthContext, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.required_spec_claims.clear();

        let decoding_key = DecodingKey::from_secret(self.secret.as_bytes());
        let data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => AuthError::Expired,
                ErrorKind::InvalidAlgorithm => AuthError::WrongAlgorithm,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::Malformed,
            }
        })?;

        if data.claims.token_type != "access" {
            return Err(AuthError::WrongTokenType);
        }

        Ok(AuthContext {
            user_id: data.claims.sub,
            role: data.claims.role,
            auth_method: AuthMethod::Jwt,
            rate_limit_override: None,
        })
    }
}

/// Persisted record shape at `apikey:<key>` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub user_id: String,
    #[serde(default)]
    pub rate_limit: Option<u64>,
    pub enabled: bool,
    pub created_at: String,
    #[serde(default)]
    pub last_used: Option<String>,
    #[serde(default)]
    pub expires_at: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

/// `Validate(key) -> {user_id, rate_limit}`. Looks up `"apikey:<key>"`,
/// enforces `enabled` and `expires_at`, and best-effort touches
/// `last_used` — failures updating that timestamp must never fail the
/// request (spec §4.8, §7).
pub struct ApiKeyValidator {
    store: Arc<dyn KvStore>,
}

impl ApiKeyValidator {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn validate(&self, key: &str) -> Result<AuthContext, AuthError> {
        let record_key = format!("apikey:{}", key);
        let bytes = match self.store.get(&record_key).await {
            Ok(bytes) => bytes,
            Err(KvError::NotFound) => return Err(AuthError::NotFound),
            Err(KvError::Transport(msg)) => return Err(AuthError::Transport(msg)),
        };

        let record: ApiKeyRecord =
            serde_json::from_slice(&bytes).map_err(|_| AuthError::ParseError)?;

        if !record.enabled {
            return Err(AuthError::Disabled);
        }

        if let Some(expires_at) = record.expires_at {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock before unix epoch")
                .as_secs();
            if now >= expires_at {
                return Err(AuthError::ApiKeyExpired);
            }
        }

        self.touch_last_used(&record_key, &record).await;

        Ok(AuthContext {
            user_id: record.user_id,
            role: None,
            auth_method: AuthMethod::ApiKey,
            rate_limit_override: record.rate_limit,
        })
    }

    async fn touch_last_used(&self, record_key: &str, record: &ApiKeyRecord) {
        let mut updated = record.clone();
        updated.last_used = Some(chrono::Utc::now().to_rfc3339());
        let Ok(bytes) = serde_json::to_vec(&updated) else {
            return;
        };
        if let Err(e) = self
            .store
            .set(record_key, bytes, std::time::Duration::ZERO)
            .await
        {
            warn!("failed to update last_used for api key: {}", e);
        }
    }
}

fn extract_bearer(req: &ServiceRequest) -> Option<String> {
    let header = req.headers().get("Authorization")?;
    let value = header.to_str().ok()?;
    value.strip_prefix("Bearer ").map(|s| s.to_string())
}

fn extract_api_key(req: &ServiceRequest, header_name: &str) -> Option<String> {
    req.headers()
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[derive(Clone)]
pub struct AuthConfig {
    pub route_matcher: Arc<crate::utils::route_matcher::RouteMatcher>,
    pub bearer: Option<Arc<BearerValidator>>,
    pub api_key: Arc<ApiKeyValidator>,
    pub api_key_header: String,
}

pub struct Auth {
    config: Rc<AuthConfig>,
}

impl Auth {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config: Rc::new(config),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Auth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware {
            service: Rc::new(service),
            config: self.config.clone(),
        })
    }
}

pub struct AuthMiddleware<S> {
    service: Rc<S>,
    config: Rc<AuthConfig>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
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
        let config = self.config.clone();

        Box::pin(async move {
            let mode = super::route_resolve::matched_auth_mode(&req, &config.route_matcher);

            let credential = match mode {
                AuthMode::None => None,
                AuthMode::Jwt => extract_bearer(&req).map(Credential::Bearer),
                AuthMode::ApiKey => {
                    extract_api_key(&req, &config.api_key_header).map(Credential::ApiKey)
                }
                AuthMode::OptionalAuth => extract_bearer(&req)
                    .map(Credential::Bearer)
                    .or_else(|| extract_api_key(&req, &config.api_key_header).map(Credential::ApiKey)),
            };

            let auth_result: Option<Result<AuthContext, AuthError>> = match (&credential, mode) {
                (None, AuthMode::None) | (None, AuthMode::OptionalAuth) => None,
                (None, _) => Some(Err(AuthError::Missing)),
                (Some(Credential::Bearer(token)), _) => Some(match &config.bearer {
                    Some(validator) => validator.validate(token),
                    None => Err(AuthError::Malformed),
                }),
                (Some(Credential::ApiKey(key)), _) => Some(config.api_key.validate(key).await),
            };

            match auth_result {
                None => {
                    let ctx = crate::context::context_of(&req);
                    let mut borrowed = ctx.borrow_mut();
                    borrowed.user_id = Some("anonymous".to_string());
                    borrowed.auth_method = Some(AuthMethod::Anonymous);
                }
                Some(Ok(auth_ctx)) => {
                    debug!(
                        "authenticated user {} via {}",
                        auth_ctx.user_id,
                        auth_ctx.auth_method.as_str()
                    );
                    let ctx = crate::context::context_of(&req);
                    let mut borrowed = ctx.borrow_mut();
                    borrowed.user_id = Some(auth_ctx.user_id);
                    borrowed.role = auth_ctx.role;
                    borrowed.auth_method = Some(auth_ctx.auth_method);
                    // Capacity-only: the credential record carries one
                    // `rate_limit` number (spec §6), not a refill rate too.
                    // The rate-limit middleware pairs this with the
                    // matched route's (or the global default's) refill
                    // rate rather than reusing this number for both.
                    borrowed.rate_limit_override = auth_ctx.rate_limit_override;
                }
                Some(Err(err)) => {
                    if mode == AuthMode::OptionalAuth {
                        let ctx = crate::context::context_of(&req);
                        let mut borrowed = ctx.borrow_mut();
                        borrowed.user_id = Some("anonymous".to_string());
                        borrowed.auth_method = Some(AuthMethod::Anonymous);
                    } else {
                        warn!("authentication failed: {}", err);
                        let request_id = crate::context::context_of(&req).borrow().request_id.clone();
                        let response = HttpResponse::Unauthorized().json(serde_json::json!({
                            "error": "authentication failed",
                            "request_id": request_id,
                        }));
                        return Ok(req.into_response(response).map_into_boxed_body());
                    }
                }
            }

            let res = service.call(req).await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::kv_store::MemoryStore;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn make_token(secret: &str, claims: Claims) -> String {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn now() -> usize {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as usize
    }

    #[test]
    fn validates_a_well_formed_access_token() {
        let validator = BearerValidator::new("secret");
        let token = make_token(
            "secret",
            Claims {
                sub: "user-1".into(),
                exp: now() + 3600,
                iat: now(),
                nbf: None,
                token_type: "access".into(),
                role: Some("admin".into()),
            },
        );
        let ctx = validator.validate(&token).unwrap();
        assert_eq!(ctx.user_id, "user-1");
        assert_eq!(ctx.role, Some("admin".into()));
    }

    #[test]
    fn rejects_refresh_token_at_resource_endpoint() {
        let validator = BearerValidator::new("secret");
        let token = make_token(
            "secret",
            Claims {
                sub: "user-1".into(),
                exp: now() + 3600,
                iat: now(),
                nbf: None,
                token_type: "refresh".into(),
                role: None,
            },
        );
        assert!(matches!(
            validator.validate(&token),
            Err(AuthError::WrongTokenType)
        ));
    }

    #[test]
    fn rejects_expired_token() {
        let validator = BearerValidator::new("secret");
        let token = make_token(
            "secret",
            Claims {
                sub: "user-1".into(),
                exp: now() - 10,
                iat: now() - 100,
                nbf: None,
                token_type: "access".into(),
                role: None,
            },
        );
        assert!(matches!(validator.validate(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn rejects_wrong_signing_secret() {
        let token = make_token(
            "secret-a",
            Claims {
                sub: "user-1".into(),
                exp: now() + 3600,
                iat: now(),
                nbf: None,
                token_type: "access".into(),
                role: None,
            },
        );
        let validator = BearerValidator::new("secret-b");
        assert!(validator.validate(&token).is_err());
    }

    #[tokio::test]
    async fn api_key_validator_rejects_missing_key() {
        let validator = ApiKeyValidator::new(MemoryStore::new());
        let err = validator.validate("nope").await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
    }

    #[tokio::test]
    async fn api_key_validator_rejects_disabled_key() {
        let store = MemoryStore::new();
        let record = ApiKeyRecord {
            user_id: "u1".into(),
            rate_limit: None,
            enabled: false,
            created_at: "2024-01-01T00:00:00Z".into(),
            last_used: None,
            expires_at: None,
            description: None,
        };
        store
            .set(
                "apikey:k1",
                serde_json::to_vec(&record).unwrap(),
                std::time::Duration::ZERO,
            )
            .await
            .unwrap();
        let validator = ApiKeyValidator::new(store);
        let err = validator.validate("k1").await.unwrap_err();
        assert!(matches!(err, AuthError::Disabled));
    }

    #[tokio::test]
    async fn api_key_validator_accepts_enabled_unexpired_key() {
        let store = MemoryStore::new();
        let record = ApiKeyRecord {
            user_id: "u1".into(),
            rate_limit: Some(50),
            enabled: true,
            created_at: "2024-01-01T00:00:00Z".into(),
            last_used: None,
            expires_at: None,
            description: None,
        };
        store
            .set(
                "apikey:k1",
                serde_json::to_vec(&record).unwrap(),
                std::time::Duration::ZERO,
            )
            .await
            .unwrap();
        let validator = ApiKeyValidator::new(store);
        let ctx = validator.validate("k1").await.unwrap();
        assert_eq!(ctx.user_id, "u1");
        assert_eq!(ctx.rate_limit_override, Some(50));
    }

    #[tokio::test]
    async fn api_key_validator_rejects_expired_key() {
        let store = MemoryStore::new();
        let record = ApiKeyRecord {
            user_id: "u1".into(),
            rate_limit: None,
            enabled: true,
            created_at: "2024-01-01T00:00:00Z".into(),
            last_used: None,
            expires_at: Some(1),
            description: None,
        };
        store
            .set(
                "apikey:k1",
                serde_json::to_vec(&record).unwrap(),
                std::time::Duration::ZERO,
            )
            .await
            .unwrap();
        let validator = ApiKeyValidator::new(store);
        let err = validator.validate("k1").await.unwrap_err();
        assert!(matches!(err, AuthError::ApiKeyExpired));
    }
}
