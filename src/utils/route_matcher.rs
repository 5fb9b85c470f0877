//! Route matching in strict config-declaration order (spec §4.7).
//!
//! Exact, prefix (`*`), and named (`:name`) patterns are evaluated in the
//! order routes were declared, not sorted by specificity: an earlier,
//! less-specific prefix route wins over a later, more-specific
//! named-parameter route for the same request path.

use crate::models::route::Route;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RouteMatchError {
    #[error("no matching route found for path: {path}")]
    NoMatch { path: String },
    #[error("method {method} not allowed on {path}")]
    MethodNotAllowed {
        method: String,
        path: String,
        allowed_methods: Vec<String>,
    },
}

pub struct MatchedRoute<'a> {
    pub route: &'a Route,
    pub params: Vec<(String, String)>,
}

/// Holds routes in declaration order and performs lookups against them.
#[derive(Debug)]
pub struct RouteMatcher {
    routes: Vec<Route>,
}

impl RouteMatcher {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Finds the first route (in declaration order) whose pattern matches
    /// `path`. A path match with a disallowed method is reported as
    /// `MethodNotAllowed` immediately rather than letting a later route
    /// take over — first path match is authoritative.
    pub fn find_match<'a>(
        &'a self,
        method: &str,
        path: &str,
    ) -> Result<MatchedRoute<'a>, RouteMatchError> {
        for route in &self.routes {
            if let Some(params) = route.matches_path(path) {
                if !route.allows_method(method) {
                    return Err(RouteMatchError::MethodNotAllowed {
                        method: method.to_string(),
                        path: path.to_string(),
                        allowed_methods: route.methods.iter().cloned().collect(),
                    });
                }
                return Ok(MatchedRoute { route, params });
            }
        }
        Err(RouteMatchError::NoMatch {
            path: path.to_string(),
        })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::route::{AuthMode, RouteSpec};

    fn route(path: &str, backend: &str, methods: &[&str]) -> Route {
        Route::from_spec(RouteSpec {
            path: path.to_string(),
            backend: backend.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            rate_limit: None,
            cache_ttl: None,
            auth: AuthMode::None,
        })
    }

    #[test]
    fn exact_route_wins_for_identical_path() {
        let matcher = RouteMatcher::new(vec![
            route("/api/users", "exact", &["GET"]),
            route("/api/users/*", "prefix", &["GET"]),
            route("/api/users/:id", "param", &["GET"]),
        ]);
        let matched = matcher.find_match("GET", "/api/users").unwrap();
        assert_eq!(matched.route.backend_name, "exact");
    }

    #[test]
    fn prefix_beats_param_in_config_order() {
        let matcher = RouteMatcher::new(vec![
            route("/api/users", "exact", &["GET"]),
            route("/api/users/*", "prefix", &["GET"]),
            route("/api/users/:id", "param", &["GET"]),
        ]);
        let matched = matcher.find_match("GET", "/api/users/123").unwrap();
        assert_eq!(matched.route.backend_name, "prefix");
    }

    #[test]
    fn no_match_returns_not_found() {
        let matcher = RouteMatcher::new(vec![route("/api/users", "b", &["GET"])]);
        let err = matcher.find_match("GET", "/nope").unwrap_err();
        assert!(matches!(err, RouteMatchError::NoMatch { .. }));
    }

    #[test]
    fn wrong_method_returns_method_not_allowed() {
        let matcher = RouteMatcher::new(vec![route("/api/users", "b", &["GET", "POST"])]);
        let err = matcher.find_match("DELETE", "/api/users").unwrap_err();
        match err {
            RouteMatchError::MethodNotAllowed { allowed_methods, .. } => {
                assert!(allowed_methods.contains(&"GET".to_string()));
                assert!(allowed_methods.contains(&"POST".to_string()));
            }
            _ => panic!("expected MethodNotAllowed"),
        }
    }

    #[test]
    fn named_param_extracts_value() {
        let matcher = RouteMatcher::new(vec![route("/api/users/:id", "b", &["GET"])]);
        let matched = matcher.find_match("GET", "/api/users/42").unwrap();
        assert_eq!(matched.params, vec![("id".to_string(), "42".to_string())]);
    }
}
