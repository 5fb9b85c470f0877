//! Comprehensive configuration validation with security and operational
//! warnings, continuing the teacher's validate-then-log idiom generalized
//! to the new `Settings` shape.

use crate::models::settings::Settings;
use log::{info, warn};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn add_recommendation(&mut self, recommendation: String) {
        self.recommendations.push(recommendation);
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate_comprehensive(settings: &Settings) -> ValidationResult {
        let mut result = ValidationResult::new();

        Self::validate_basic_structure(settings, &mut result);
        Self::validate_security(settings, &mut result);
        Self::validate_route_conflicts(settings, &mut result);
        Self::log_validation_results(&result);

        result
    }

    fn validate_basic_structure(settings: &Settings, result: &mut ValidationResult) {
        if settings.backends.is_empty() {
            result.add_error("no backends configured - gateway has nothing to proxy to".to_string());
        }
        if settings.routes.is_empty() {
            result.add_error("no routes configured - gateway will not handle any requests".to_string());
        }

        let backend_names: HashSet<&str> =
            settings.backends.iter().map(|b| b.name.as_str()).collect();
        if backend_names.len() != settings.backends.len() {
            result.add_error("duplicate backend names detected".to_string());
        }

        for (index, route) in settings.routes.iter().enumerate() {
            if route.methods.is_empty() {
                result.add_error(format!("route {} declares no HTTP methods", index));
            }
            if !backend_names.contains(route.backend.as_str()) {
                result.add_error(format!(
                    "route {} references unknown backend '{}'",
                    index, route.backend
                ));
            }
        }

        for backend in &settings.backends {
            if backend.weight == 0 {
                result.add_error(format!("backend '{}' weight must be greater than zero", backend.name));
            }
        }
    }

    fn validate_security(settings: &Settings, result: &mut ValidationResult) {
        let mut http_backends = 0;
        let mut https_backends = 0;

        for backend in &settings.backends {
            if backend.url.starts_with("http://") {
                http_backends += 1;
                if backend.url.contains("localhost") || backend.url.contains("127.0.0.1") {
                    result.add_warning(format!(
                        "HTTP backend to localhost detected: {} - consider HTTPS for production",
                        backend.url
                    ));
                } else {
                    result.add_warning(format!(
                        "insecure HTTP backend detected: {} - consider HTTPS",
                        backend.url
                    ));
                }
            } else if backend.url.starts_with("https://") {
                https_backends += 1;
            }
        }

        if http_backends > 0 && https_backends == 0 {
            result.add_warning("all backends use HTTP - consider HTTPS for production security".to_string());
        }

        if settings.auth.jwt.is_none() && settings.auth.api_key.is_none() {
            result.add_recommendation(
                "no auth method configured - all routes with auth: jwt/api_key will reject every request".to_string(),
            );
        }
    }

    fn validate_route_conflicts(settings: &Settings, result: &mut ValidationResult) {
        let mut seen_paths = HashSet::new();

        for route in &settings.routes {
            if seen_paths.contains(&route.path) {
                result.add_error(format!("duplicate route path detected: {}", route.path));
            }
            seen_paths.insert(route.path.clone());
        }
    }

    fn log_validation_results(result: &ValidationResult) {
        if result.is_valid {
            info!("configuration validation passed");
        } else {
            for error in &result.errors {
                log::error!("validation error: {}", error);
            }
        }
        for warning in &result.warnings {
            warn!("validation warning: {}", warning);
        }
        for recommendation in &result.recommendations {
            info!("recommendation: {}", recommendation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backend::BackendSpec;
    use crate::models::route::{AuthMode, RouteSpec};

    fn backend(name: &str, url: &str) -> BackendSpec {
        BackendSpec {
            name: name.to_string(),
            url: url.to_string(),
            health_check: String::new(),
            weight: 1,
        }
    }

    fn route(path: &str, backend: &str) -> RouteSpec {
        RouteSpec {
            path: path.to_string(),
            backend: backend.to_string(),
            methods: vec!["GET".to_string()],
            rate_limit: None,
            cache_ttl: None,
            auth: AuthMode::None,
        }
    }

    #[test]
    fn empty_configuration_is_invalid() {
        let settings = Settings {
            backends: vec![],
            routes: vec![],
            ..Settings::default()
        };
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("no backends")));
    }

    #[test]
    fn route_to_unknown_backend_is_invalid() {
        let settings = Settings {
            backends: vec![backend("a", "https://a.example.com")],
            routes: vec![route("/x", "missing")],
            ..Settings::default()
        };
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("unknown backend")));
    }

    #[test]
    fn http_backend_produces_security_warning() {
        let settings = Settings {
            backends: vec![backend("a", "http://example.com")],
            routes: vec![route("/x", "a")],
            ..Settings::default()
        };
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(result.warnings.iter().any(|w| w.contains("HTTP backend")));
    }

    #[test]
    fn duplicate_route_paths_are_invalid() {
        let settings = Settings {
            backends: vec![backend("a", "https://example.com")],
            routes: vec![route("/x", "a"), route("/x", "a")],
            ..Settings::default()
        };
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("Duplicate") || e.contains("duplicate")));
    }
}
