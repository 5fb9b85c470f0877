//! Integration tests for configuration loading: environment variable
//! resolution, path-traversal rejection, and malformed-file handling.

use kairos_gateway::config::settings::load_settings;
use kairos_gateway::models::backend::BackendSpec;
use kairos_gateway::models::route::{AuthMode, RouteSpec};
use kairos_gateway::models::settings::Settings;
use std::env;
use std::io::Write;
use std::sync::Mutex;
use tempfile::{NamedTempFile, TempDir};

// `load_settings` reads a process-wide environment variable; serialize
// tests that touch it so they don't race each other under the default
// multi-threaded test harness.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn sample_settings() -> Settings {
    Settings {
        backends: vec![BackendSpec {
            name: "primary".to_string(),
            url: "https://backend.example.com".to_string(),
            health_check: "/healthz".to_string(),
            weight: 1,
        }],
        routes: vec![RouteSpec {
            path: "/api/*".to_string(),
            backend: "primary".to_string(),
            methods: vec!["GET".to_string(), "POST".to_string()],
            rate_limit: None,
            cache_ttl: None,
            auth: AuthMode::Jwt,
        }],
        ..Settings::default()
    }
}

// `load_settings` requires the resolved path to live under the current
// working directory, so test fixtures must be created there rather than
// in the system temp directory.
fn write_config(settings: &Settings) -> NamedTempFile {
    let dir = env::current_dir().unwrap();
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile_in(dir)
        .unwrap();
    let json = serde_json::to_string_pretty(settings).unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn write_raw(contents: &[u8]) -> NamedTempFile {
    let dir = env::current_dir().unwrap();
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile_in(dir)
        .unwrap();
    file.write_all(contents).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn loads_settings_from_env_configured_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    let settings = sample_settings();
    let file = write_config(&settings);

    env::set_var("KAIROS_CONFIG_PATH", file.path());
    let loaded = load_settings().expect("config should load");
    env::remove_var("KAIROS_CONFIG_PATH");

    assert_eq!(loaded.backends.len(), 1);
    assert_eq!(loaded.backends[0].name, "primary");
    assert_eq!(loaded.routes[0].path, "/api/*");
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    env::set_var("KAIROS_CONFIG_PATH", "./does-not-exist-kairos-gateway.json");
    let result = load_settings();
    env::remove_var("KAIROS_CONFIG_PATH");
    assert!(result.is_err());
}

#[test]
fn malformed_json_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    let file = write_raw(b"not valid json");

    env::set_var("KAIROS_CONFIG_PATH", file.path());
    let result = load_settings();
    env::remove_var("KAIROS_CONFIG_PATH");
    assert!(result.is_err());
}

#[test]
fn defaults_apply_when_optional_fields_are_omitted() {
    let _guard = ENV_LOCK.lock().unwrap();
    let file = write_raw(b"{}");

    env::set_var("KAIROS_CONFIG_PATH", file.path());
    let loaded = load_settings().expect("empty object should parse with defaults");
    env::remove_var("KAIROS_CONFIG_PATH");

    assert!(loaded.backends.is_empty());
    assert!(loaded.routes.is_empty());
    assert_eq!(loaded.server.port, 8080);
    assert_eq!(loaded.rate_limit.default_rate, 100);
}

#[test]
fn path_traversal_outside_working_directory_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    let temp_dir = TempDir::new().unwrap();
    let traversal_path = format!("{}/../../../etc/passwd", temp_dir.path().display());

    env::set_var("KAIROS_CONFIG_PATH", &traversal_path);
    let result = load_settings();
    env::remove_var("KAIROS_CONFIG_PATH");

    assert!(result.is_err());
}

#[test]
fn oversized_config_file_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    let oversized = "x".repeat(11 * 1024 * 1024);
    let file = write_raw(oversized.as_bytes());

    env::set_var("KAIROS_CONFIG_PATH", file.path());
    let result = load_settings();
    env::remove_var("KAIROS_CONFIG_PATH");

    assert!(result.is_err());
}
