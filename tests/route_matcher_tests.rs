//! Integration tests for route resolution order, parameter extraction, and
//! method-not-allowed handling across a realistic multi-route table.

use kairos_gateway::models::route::{AuthMode, RateLimitOverride, Route, RouteSpec};
use kairos_gateway::utils::route_matcher::{RouteMatchError, RouteMatcher};

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

fn sample_matcher() -> RouteMatcher {
    RouteMatcher::new(vec![
        route("/api/identity/register", "identity", &["POST"]),
        route("/cats/:id", "cats", &["GET"]),
        route("/api/users/:user_id", "users", &["GET", "PUT", "DELETE"]),
        route(
            "/api/orders/:order_id/items/:item_id",
            "orders",
            &["GET", "PUT"],
        ),
        route("/api/static/path", "static-site", &["GET"]),
        route("/api/public/*", "public", &["GET"]),
    ])
}

#[test]
fn exact_route_matches_only_its_own_path() {
    let matcher = sample_matcher();
    let matched = matcher
        .find_match("POST", "/api/identity/register")
        .unwrap();
    assert_eq!(matched.route.backend_name, "identity");
    assert!(matched.params.is_empty());
}

#[test]
fn single_named_parameter_is_extracted() {
    let matcher = sample_matcher();
    let matched = matcher.find_match("GET", "/cats/200").unwrap();
    assert_eq!(matched.route.backend_name, "cats");
    assert_eq!(matched.params, vec![("id".to_string(), "200".to_string())]);
}

#[test]
fn multiple_named_parameters_are_extracted_in_order() {
    let matcher = sample_matcher();
    let matched = matcher
        .find_match("GET", "/api/orders/123/items/456")
        .unwrap();
    assert_eq!(
        matched.params,
        vec![
            ("order_id".to_string(), "123".to_string()),
            ("item_id".to_string(), "456".to_string()),
        ]
    );
}

#[test]
fn unmatched_path_is_no_match() {
    let matcher = sample_matcher();
    let err = matcher.find_match("GET", "/api/nonexistent").unwrap_err();
    assert!(matches!(err, RouteMatchError::NoMatch { .. }));
}

#[test]
fn extra_trailing_segment_does_not_match_named_route() {
    let matcher = sample_matcher();
    let err = matcher
        .find_match("GET", "/api/users/123/extra")
        .unwrap_err();
    assert!(matches!(err, RouteMatchError::NoMatch { .. }));
}

#[test]
fn disallowed_method_on_a_matched_path_is_method_not_allowed() {
    let matcher = sample_matcher();
    let err = matcher
        .find_match("DELETE", "/api/identity/register")
        .unwrap_err();
    match err {
        RouteMatchError::MethodNotAllowed { allowed_methods, .. } => {
            assert_eq!(allowed_methods, vec!["POST".to_string()]);
        }
        other => panic!("expected MethodNotAllowed, got {:?}", other),
    }
}

#[test]
fn prefix_route_matches_any_suffix() {
    let matcher = sample_matcher();
    assert!(matcher.find_match("GET", "/api/public/a/b/c").is_ok());
    assert!(matcher.find_match("GET", "/api/public").is_ok());
}

#[test]
fn declaration_order_decides_precedence_not_specificity() {
    // A prefix route declared ahead of a more specific named route wins,
    // because matching walks the table in declaration order.
    let matcher = RouteMatcher::new(vec![
        route("/api/orders/*", "catch-all", &["GET"]),
        route("/api/orders/:id", "specific", &["GET"]),
    ]);
    let matched = matcher.find_match("GET", "/api/orders/42").unwrap();
    assert_eq!(matched.route.backend_name, "catch-all");
}

#[test]
fn root_path_with_no_declared_route_is_no_match() {
    let matcher = sample_matcher();
    assert!(matcher.find_match("GET", "/").is_err());
}

#[test]
fn route_carries_its_rate_limit_override_through_from_spec() {
    let route = Route::from_spec(RouteSpec {
        path: "/api/limited".to_string(),
        backend: "b".to_string(),
        methods: vec!["GET".to_string()],
        rate_limit: Some(RateLimitOverride {
            capacity: 10,
            refill_rate: 5,
        }),
        cache_ttl: Some(60),
        auth: AuthMode::ApiKey,
    });
    assert_eq!(route.cache_ttl_secs, 60);
    assert_eq!(route.auth, AuthMode::ApiKey);
    let over = route.rate_limit_override.unwrap();
    assert_eq!(over.capacity, 10);
    assert_eq!(over.refill_rate, 5);
}
