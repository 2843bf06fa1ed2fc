//! Configuration module for Storehouse.

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

use crate::{Result, StorehouseError};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Storage root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory that every operation is confined to.
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// Whether directories appear as entries in the flat listing.
    #[serde(default)]
    pub list_directories: bool,
    /// Maximum recursion depth for tree walks.
    #[serde(default = "default_max_walk_depth")]
    pub max_walk_depth: usize,
}

fn default_storage_root() -> String {
    "storage".to_string()
}

fn default_max_walk_depth() -> usize {
    64
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            list_directories: false,
            max_walk_depth: default_max_walk_depth(),
        }
    }
}

/// Upload limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum uploads per client in one window.
    #[serde(default = "default_max_uploads_per_window")]
    pub max_uploads_per_window: u32,
    /// Length of the sliding window in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Maximum size of a single file in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Maximum number of files in one batch upload.
    #[serde(default = "default_max_files_per_batch")]
    pub max_files_per_batch: usize,
    /// Content types that are never stored.
    #[serde(default = "default_blocked_mime_types")]
    pub blocked_mime_types: Vec<String>,
}

fn default_max_uploads_per_window() -> u32 {
    100
}

fn default_window_secs() -> u64 {
    3600 // 1 hour
}

fn default_max_file_size() -> u64 {
    500 * 1024 * 1024 // 500MB
}

fn default_max_files_per_batch() -> usize {
    50
}

fn default_blocked_mime_types() -> Vec<String> {
    [
        "application/x-msdownload",
        "application/x-dosexec",
        "application/x-sh",
        "application/x-msdos-program",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_uploads_per_window: default_max_uploads_per_window(),
            window_secs: default_window_secs(),
            max_file_size: default_max_file_size(),
            max_files_per_batch: default_max_files_per_batch(),
            blocked_mime_types: default_blocked_mime_types(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional path to a log file. Console only when unset.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Web API configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WebConfig {
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Include internal error text in error responses.
    #[serde(default)]
    pub diagnostic_errors: bool,
    /// Charge quotas to `X-Forwarded-For`/`X-Real-IP` instead of the socket
    /// peer. Only enable behind a reverse proxy that overwrites these headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Upload limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Web API configuration.
    #[serde(default)]
    pub web: WebConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| StorehouseError::Config(format!("parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `PORT`: listening port
    /// - `STOREHOUSE_HOST`: bind address
    /// - `STOREHOUSE_STORAGE_ROOT`: storage directory
    /// - `STOREHOUSE_MAX_UPLOADS_PER_HOUR`: per-client quota
    /// - `STOREHOUSE_MAX_FILE_SIZE`: maximum file size in bytes
    /// - `STOREHOUSE_MAX_FILES`: maximum files per batch
    /// - `STOREHOUSE_LOG_LEVEL`: log level
    /// - `STOREHOUSE_DIAGNOSTIC`: `1`/`true` to expose internal error details
    /// - `STOREHOUSE_TRUST_PROXY`: `1`/`true` to identify clients by proxy headers
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup function.
    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.server.port = parse_env("PORT", &port)?;
        }
        if let Some(host) = get("STOREHOUSE_HOST") {
            self.server.host = host;
        }
        if let Some(root) = get("STOREHOUSE_STORAGE_ROOT") {
            self.storage.root = root;
        }
        if let Some(quota) = get("STOREHOUSE_MAX_UPLOADS_PER_HOUR") {
            self.limits.max_uploads_per_window = parse_env("STOREHOUSE_MAX_UPLOADS_PER_HOUR", &quota)?;
        }
        if let Some(size) = get("STOREHOUSE_MAX_FILE_SIZE") {
            self.limits.max_file_size = parse_env("STOREHOUSE_MAX_FILE_SIZE", &size)?;
        }
        if let Some(files) = get("STOREHOUSE_MAX_FILES") {
            self.limits.max_files_per_batch = parse_env("STOREHOUSE_MAX_FILES", &files)?;
        }
        if let Some(level) = get("STOREHOUSE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(flag) = get("STOREHOUSE_DIAGNOSTIC") {
            self.web.diagnostic_errors = parse_flag(&flag);
        }
        if let Some(flag) = get("STOREHOUSE_TRUST_PROXY") {
            self.web.trust_proxy_headers = parse_flag(&flag);
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.storage.root.trim().is_empty() {
            return Err(StorehouseError::Config("storage root must not be empty".into()));
        }
        if self.storage.max_walk_depth == 0 {
            return Err(StorehouseError::Config("max_walk_depth must be at least 1".into()));
        }
        if self.limits.max_uploads_per_window == 0 {
            return Err(StorehouseError::Config("upload quota must be at least 1".into()));
        }
        if self.limits.window_secs == 0 {
            return Err(StorehouseError::Config("rate window must be at least 1 second".into()));
        }
        if self.limits.max_file_size == 0 {
            return Err(StorehouseError::Config("max_file_size must be positive".into()));
        }
        if self.limits.max_files_per_batch == 0 {
            return Err(StorehouseError::Config("max_files_per_batch must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| StorehouseError::Config(format!("{key} has an invalid value: {value}")))
}
