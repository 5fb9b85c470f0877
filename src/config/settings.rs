//! Configuration file loading.
//!
//! Loads the gateway's [`Settings`] from a JSON file on disk, with the same
//! path-traversal and size-limit guards the teacher applies, generalized to
//! the new settings shape (server/auth/rate_limit/cache/circuit/backends/
//! routes instead of the old flat router list).

use crate::models::settings::Settings;
use log::{debug, warn};
use std::fs;
use std::path::Path;

const MAX_CONFIG_SIZE: u64 = 10 * 1024 * 1024;

/// Loads and parses the gateway configuration file.
///
/// Resolved from `KAIROS_CONFIG_PATH` (default `./config.json`). The path is
/// canonicalized and checked against the current working directory to block
/// path traversal, and the file is size-capped before being read into
/// memory, same as the teacher's loader.
pub fn load_settings() -> Result<Settings, Box<dyn std::error::Error>> {
    let config_path =
        std::env::var("KAIROS_CONFIG_PATH").unwrap_or_else(|_| "./config.json".to_string());

    debug!("loading configuration from: {}", config_path);

    let path = Path::new(&config_path);
    if !path.exists() {
        return Err(format!("cannot resolve config path '{}'", config_path).into());
    }

    let canonical_path = path
        .canonicalize()
        .map_err(|e| format!("cannot resolve config path '{}': {}", config_path, e))?;

    let current_dir =
        std::env::current_dir().map_err(|e| format!("cannot get current directory: {}", e))?;

    if !canonical_path.starts_with(&current_dir) {
        warn!("config path '{}' is outside working directory", config_path);
        return Err("config path outside working directory".into());
    }

    let metadata = fs::metadata(&canonical_path)
        .map_err(|e| format!("cannot read config file metadata: {}", e))?;
    if metadata.len() > MAX_CONFIG_SIZE {
        return Err(format!(
            "config file too large: {} bytes (max: {} bytes)",
            metadata.len(),
            MAX_CONFIG_SIZE
        )
        .into());
    }

    let config_data = fs::read_to_string(&canonical_path)
        .map_err(|e| format!("cannot read config file: {}", e))?;

    let settings: Settings =
        serde_json::from_str(&config_data).map_err(|e| format!("invalid JSON: {}", e))?;

    debug!(
        "loaded configuration with {} backend(s) and {} route(s)",
        settings.backends.len(),
        settings.routes.len()
    );

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(json: &str) -> NamedTempFile {
        let dir = std::env::current_dir().unwrap();
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile_in(dir)
            .unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_minimal_valid_config() {
        let file = write_config(r#"{"backends":[],"routes":[]}"#);
        std::env::set_var("KAIROS_CONFIG_PATH", file.path());
        let settings = load_settings().unwrap();
        assert!(settings.backends.is_empty());
        std::env::remove_var("KAIROS_CONFIG_PATH");
    }

    #[test]
    fn rejects_missing_file() {
        std::env::set_var("KAIROS_CONFIG_PATH", "./does-not-exist-kairos.json");
        let result = load_settings();
        assert!(result.is_err());
        std::env::remove_var("KAIROS_CONFIG_PATH");
    }

    #[test]
    fn rejects_invalid_json() {
        let file = write_config("not json");
        std::env::set_var("KAIROS_CONFIG_PATH", file.path());
        let result = load_settings();
        assert!(result.is_err());
        std::env::remove_var("KAIROS_CONFIG_PATH");
    }
}
