//! Static route declarations matched by the request pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One of the three path-pattern forms a route may declare.
///
/// Parsed once at startup from the raw `path_pattern` string so the
/// matcher never re-parses a pattern per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    Exact(String),
    Prefix(String),
    Named(Vec<Segment>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

impl PathPattern {
    pub fn parse(raw: &str) -> Self {
        if let Some(prefix) = raw.strip_suffix('*') {
            let prefix = prefix.strip_suffix('/').unwrap_or(prefix);
            return PathPattern::Prefix(prefix.to_string());
        }
        if raw.contains(':') {
            let segments = raw
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| {
                    if let Some(name) = s.strip_prefix(':') {
                        Segment::Param(name.to_string())
                    } else {
                        Segment::Literal(s.to_string())
                    }
                })
                .collect();
            return PathPattern::Named(segments);
        }
        PathPattern::Exact(raw.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSpec {
    pub path: String,
    pub backend: String,
    pub methods: Vec<String>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitOverride>,
    #[serde(default)]
    pub cache_ttl: Option<u64>,
    #[serde(default)]
    pub auth: AuthMode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    None,
    Jwt,
    ApiKey,
    OptionalAuth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitOverride {
    pub capacity: u64,
    pub refill_rate: u64,
}

/// A route as consumed by the pipeline: the parsed pattern plus the raw
/// declaration order index, since matching must respect config order.
#[derive(Debug, Clone)]
pub struct Route {
    pub pattern: PathPattern,
    pub raw_path: String,
    pub backend_name: String,
    pub methods: HashSet<String>,
    pub rate_limit_override: Option<RateLimitOverride>,
    pub cache_ttl_secs: u64,
    pub auth: AuthMode,
}

pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

impl Route {
    pub fn from_spec(spec: RouteSpec) -> Self {
        let methods = spec
            .methods
            .iter()
            .map(|m| m.to_uppercase())
            .collect::<HashSet<_>>();
        Self {
            pattern: PathPattern::parse(&spec.path),
            raw_path: spec.path,
            backend_name: spec.backend,
            methods,
            rate_limit_override: spec.rate_limit,
            cache_ttl_secs: spec.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL_SECS),
            auth: spec.auth,
        }
    }

    /// Returns `Some(params)` (empty for exact/prefix matches) when `path`
    /// matches this route's pattern, per the three matching rules in the
    /// design: exact equality, prefix-with-`*`, and equal-length
    /// `:name`-segment matching.
    pub fn matches_path(&self, path: &str) -> Option<Vec<(String, String)>> {
        match &self.pattern {
            PathPattern::Exact(p) => (p == path).then(Vec::new),
            PathPattern::Prefix(prefix) => path.starts_with(prefix.as_str()).then(Vec::new),
            PathPattern::Named(segments) => {
                let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if parts.len() != segments.len() {
                    return None;
                }
                let mut params = Vec::new();
                for (seg, part) in segments.iter().zip(parts.iter()) {
                    match seg {
                        Segment::Literal(l) => {
                            if l != part {
                                return None;
                            }
                        }
                        Segment::Param(name) => params.push((name.clone(), (*part).to_string())),
                    }
                }
                Some(params)
            }
        }
    }

    pub fn allows_method(&self, method: &str) -> bool {
        self.methods.contains(&method.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(path: &str) -> Route {
        route_with_backend(path, "b")
    }

    fn route_with_backend(path: &str, backend: &str) -> Route {
        Route::from_spec(RouteSpec {
            path: path.to_string(),
            backend: backend.to_string(),
            methods: vec!["GET".into()],
            rate_limit: None,
            cache_ttl: None,
            auth: AuthMode::None,
        })
    }

    #[test]
    fn exact_matches_only_identical_path() {
        let r = route("/api/users");
        assert!(r.matches_path("/api/users").is_some());
        assert!(r.matches_path("/api/users/123").is_none());
    }

    #[test]
    fn prefix_matches_anything_starting_with_it() {
        let r = route("/api/users/*");
        assert!(r.matches_path("/api/users/123").is_some());
        assert!(r.matches_path("/api/users").is_some());
        assert!(r.matches_path("/api/other").is_none());
    }

    #[test]
    fn named_param_requires_equal_segment_count() {
        let r = route("/api/users/:id");
        let params = r.matches_path("/api/users/123").unwrap();
        assert_eq!(params, vec![("id".to_string(), "123".to_string())]);
        assert!(r.matches_path("/api/users/123/posts").is_none());
    }

    #[test]
    fn route_precedence_scenario_from_design() {
        // routes declared in this order: exact, prefix, named — prefix
        // must win over the named-param route for "/api/users/123"
        // because it is declared earlier, per config-order evaluation.
        let routes = vec![
            route_with_backend("/api/users", "exact-backend"),
            route_with_backend("/api/users/*", "prefix-backend"),
            route_with_backend("/api/users/:id", "param-backend"),
        ];
        let matched = routes.iter().find(|r| r.matches_path("/api/users/123").is_some());
        assert_eq!(matched.unwrap().backend_name, "prefix-backend");
    }
}
