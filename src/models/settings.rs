//! The configuration shape the core consumes (spec §6). Parsing this shape
//! from a file is ambient plumbing handled by [`crate::config::settings`];
//! the core itself only ever depends on the in-memory values below.

use super::backend::BackendSpec;
use super::route::RouteSpec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_read_timeout_ms() -> u64 {
    5_000
}
fn default_write_timeout_ms() -> u64 {
    5_000
}
fn default_idle_timeout_ms() -> u64 {
    30_000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    pub secret: String,
    #[serde(default = "default_access_expiry_secs")]
    pub access_expiry_secs: u64,
    #[serde(default = "default_refresh_expiry_secs")]
    pub refresh_expiry_secs: u64,
}

fn default_access_expiry_secs() -> u64 {
    3_600
}
fn default_refresh_expiry_secs() -> u64 {
    7 * 24 * 3_600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_api_key_header")]
    pub header: String,
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthSettings {
    pub jwt: Option<JwtSettings>,
    #[serde(default)]
    pub api_key: Option<ApiKeySettings>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStorage {
    Memory,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_rate")]
    pub default_rate: u64,
    #[serde(default = "default_burst_capacity")]
    pub burst_capacity: u64,
    #[serde(default = "default_storage")]
    pub storage: RateLimitStorage,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_rate() -> u64 {
    100
}
fn default_burst_capacity() -> u64 {
    200
}
fn default_storage() -> RateLimitStorage {
    RateLimitStorage::Memory
}
fn default_cleanup_interval_secs() -> u64 {
    60
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            default_rate: default_rate(),
            burst_capacity: default_burst_capacity(),
            storage: default_storage(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMemorySettings {
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_max_size() -> usize {
    10_000
}
fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for CacheMemorySettings {
    fn default() -> Self {
        Self {
            max_size: default_cache_max_size(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRemoteSettings {
    pub addr: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub db: Option<u32>,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheSettings {
    #[serde(default)]
    pub memory: CacheMemorySettings,
    #[serde(default)]
    pub remote: Option<CacheRemoteSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_recovery_timeout_secs() -> u64 {
    30
}
fn default_max_requests() -> u32 {
    1
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
            max_requests: default_max_requests(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub circuit: CircuitSettings,
    #[serde(default)]
    pub backends: Vec<BackendSpec>,
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            auth: AuthSettings::default(),
            rate_limit: RateLimitSettings::default(),
            cache: CacheSettings::default(),
            circuit: CircuitSettings::default(),
            backends: Vec::new(),
            routes: Vec::new(),
        }
    }
}
