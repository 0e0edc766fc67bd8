//! Configuration module for filedrop.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::storage::MIN_PART_SIZE;
use crate::{FiledropError, Result};

const MEGABYTE: u64 = 1024 * 1024;

/// Web API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Host address to bind.
    #[serde(default = "default_web_host")]
    pub host: String,
    /// Port number for the Web API.
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// JWT secret key used to verify session tokens.
    #[serde(default)]
    pub jwt_secret: String,
    /// Lifetime of tokens issued by `filedrop token`, in seconds.
    #[serde(default = "default_session_expiry")]
    pub session_expiry_secs: u64,
    /// Whether to serve static files (browser UI).
    #[serde(default)]
    pub serve_static: bool,
    /// Path to static files directory.
    #[serde(default = "default_static_path")]
    pub static_path: String,
    /// Rate limit for API endpoints (requests per minute per client).
    #[serde(default = "default_api_rate_limit")]
    pub api_rate_limit: u32,
}

fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    8080
}

fn default_session_expiry() -> u64 {
    86400 // 1 day
}

fn default_static_path() -> String {
    "web/dist".to_string()
}

fn default_api_rate_limit() -> u32 {
    600
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            cors_origins: vec![],
            jwt_secret: String::new(),
            session_expiry_secs: default_session_expiry(),
            serve_static: false,
            static_path: default_static_path(),
            api_rate_limit: default_api_rate_limit(),
        }
    }
}

/// Which object store backs the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Objects on the local filesystem under `storage.path`.
    Filesystem,
    /// Objects held in process memory (lost on restart).
    Memory,
    /// No backend bound; bucket actions fail with a configuration error.
    None,
}

/// Object storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend kind.
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    /// Root directory for the filesystem backend.
    #[serde(default = "default_storage_path")]
    pub path: String,
    /// Smallest allowed size of a non-final multipart part, in megabytes.
    #[serde(default = "default_min_part_size")]
    pub min_part_size_mb: u64,
    /// Largest accepted upload-part body, in megabytes.
    #[serde(default = "default_max_part_size")]
    pub max_part_size_mb: u64,
    /// Largest accepted single-shot upload, in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Filesystem
}

fn default_storage_path() -> String {
    "data/bucket".to_string()
}

fn default_min_part_size() -> u64 {
    5
}

fn default_max_part_size() -> u64 {
    100
}

fn default_max_upload_size() -> u64 {
    100
}

impl StorageConfig {
    /// Minimum non-final part size in bytes.
    pub fn min_part_size(&self) -> u64 {
        self.min_part_size_mb * MEGABYTE
    }

    /// Maximum upload-part body in bytes.
    pub fn max_part_size(&self) -> u64 {
        self.max_part_size_mb * MEGABYTE
    }

    /// Maximum single-shot upload in bytes.
    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size_mb * MEGABYTE
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: default_storage_path(),
            min_part_size_mb: default_min_part_size(),
            max_part_size_mb: default_max_part_size(),
            max_upload_size_mb: default_max_upload_size(),
        }
    }
}

/// Client-side chunked upload configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Chunk size in megabytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size_mb: u64,
    /// Attempts per part before the upload fails.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff unit in milliseconds; the wait after attempt `n` is `n` units.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    /// Per-request timeout for a part upload, in seconds.
    #[serde(default = "default_part_timeout")]
    pub part_timeout_secs: u64,
    /// Abort the session when an upload fails after it was created.
    #[serde(default)]
    pub abort_on_failure: bool,
}

fn default_chunk_size() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_part_timeout() -> u64 {
    25 // stays under the 30s proxy ceiling
}

impl UploadConfig {
    /// Chunk size in bytes.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size_mb * MEGABYTE
    }

    /// Backoff unit.
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Per-request part timeout.
    pub fn part_timeout(&self) -> Duration {
        Duration::from_secs(self.part_timeout_secs)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size_mb: default_chunk_size(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            part_timeout_secs: default_part_timeout(),
            abort_on_failure: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/filedrop.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Web API configuration.
    #[serde(default)]
    pub web: WebConfig,
    /// Object storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Chunked upload client configuration.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FiledropError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FiledropError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FILEDROP_JWT_SECRET`: Override the JWT secret key
    /// - `FILEDROP_STORAGE_PATH`: Override the filesystem backend root
    pub fn apply_env_overrides(&mut self) {
        if let Ok(jwt_secret) = std::env::var("FILEDROP_JWT_SECRET") {
            if !jwt_secret.is_empty() {
                self.web.jwt_secret = jwt_secret;
            }
        }

        if let Ok(path) = std::env::var("FILEDROP_STORAGE_PATH") {
            if !path.is_empty() {
                self.storage.path = path;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.web.jwt_secret.is_empty() {
            return Err(FiledropError::Config(
                "jwt_secret is not set. \
                 Set it in config.toml or via FILEDROP_JWT_SECRET environment variable."
                    .to_string(),
            ));
        }

        if self.upload.max_attempts == 0 {
            return Err(FiledropError::Config(
                "upload.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.upload.chunk_size() < MIN_PART_SIZE {
            return Err(FiledropError::Config(format!(
                "upload.chunk_size_mb must be at least {} MB",
                MIN_PART_SIZE / MEGABYTE
            )));
        }

        if self.storage.max_part_size() < self.upload.chunk_size() {
            return Err(FiledropError::Config(
                "storage.max_part_size_mb must not be smaller than upload.chunk_size_mb"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.web.host, "0.0.0.0");
        assert_eq!(config.web.port, 8080);
        assert!(config.web.cors_origins.is_empty());
        assert!(config.web.jwt_secret.is_empty());
        assert_eq!(config.web.session_expiry_secs, 86400);
        assert!(!config.web.serve_static);
        assert_eq!(config.web.static_path, "web/dist");
        assert_eq!(config.web.api_rate_limit, 600);

        assert_eq!(config.storage.backend, StorageBackend::Filesystem);
        assert_eq!(config.storage.path, "data/bucket");
        assert_eq!(config.storage.min_part_size(), 5 * MEGABYTE);
        assert_eq!(config.storage.max_part_size(), 100 * MEGABYTE);
        assert_eq!(config.storage.max_upload_size(), 100 * MEGABYTE);

        assert_eq!(config.upload.chunk_size(), 5 * MEGABYTE);
        assert_eq!(config.upload.max_attempts, 3);
        assert_eq!(config.upload.backoff_base(), Duration::from_secs(1));
        assert_eq!(config.upload.part_timeout(), Duration::from_secs(25));
        assert!(!config.upload.abort_on_failure);

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/filedrop.log");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[web]
host = "127.0.0.1"
port = 3000
cors_origins = ["http://localhost:5173"]
jwt_secret = "test-secret-key"
session_expiry_secs = 600
serve_static = true
static_path = "public"
api_rate_limit = 50

[storage]
backend = "memory"
path = "custom/bucket"
min_part_size_mb = 8
max_part_size_mb = 64
max_upload_size_mb = 16

[upload]
chunk_size_mb = 8
max_attempts = 5
backoff_base_ms = 250
part_timeout_secs = 10
abort_on_failure = true

[logging]
level = "debug"
file = "custom/logs/app.log"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.web.port, 3000);
        assert_eq!(config.web.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.web.jwt_secret, "test-secret-key");
        assert_eq!(config.web.session_expiry_secs, 600);
        assert!(config.web.serve_static);
        assert_eq!(config.web.static_path, "public");
        assert_eq!(config.web.api_rate_limit, 50);

        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.path, "custom/bucket");
        assert_eq!(config.storage.min_part_size(), 8 * MEGABYTE);
        assert_eq!(config.storage.max_part_size(), 64 * MEGABYTE);
        assert_eq!(config.storage.max_upload_size(), 16 * MEGABYTE);

        assert_eq!(config.upload.chunk_size(), 8 * MEGABYTE);
        assert_eq!(config.upload.max_attempts, 5);
        assert_eq!(config.upload.backoff_base(), Duration::from_millis(250));
        assert_eq!(config.upload.part_timeout(), Duration::from_secs(10));
        assert!(config.upload.abort_on_failure);

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, "custom/logs/app.log");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[web]
port = 9000

[storage]
backend = "none"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.web.port, 9000);
        assert_eq!(config.storage.backend, StorageBackend::None);

        // Default values
        assert_eq!(config.web.host, "0.0.0.0");
        assert_eq!(config.storage.path, "data/bucket");
        assert_eq!(config.upload.max_attempts, 3);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.web.port, 8080);
        assert_eq!(config.storage.backend, StorageBackend::Filesystem);
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("this is not valid toml [[[");

        assert!(result.is_err());
        if let Err(FiledropError::Config(msg)) = result {
            assert!(msg.contains("config parse error"));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_parse_unknown_backend() {
        let result = Config::parse("[storage]\nbackend = \"s3\"\n");
        assert!(matches!(result, Err(FiledropError::Config(_))));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");
        assert!(matches!(result, Err(FiledropError::Io(_))));
    }

    #[test]
    fn test_apply_env_overrides() {
        let original_secret = std::env::var("FILEDROP_JWT_SECRET").ok();
        let original_path = std::env::var("FILEDROP_STORAGE_PATH").ok();

        std::env::set_var("FILEDROP_JWT_SECRET", "env-secret-key");
        std::env::set_var("FILEDROP_STORAGE_PATH", "");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.web.jwt_secret, "env-secret-key");
        // Empty values do not override
        assert_eq!(config.storage.path, "data/bucket");

        match original_secret {
            Some(val) => std::env::set_var("FILEDROP_JWT_SECRET", val),
            None => std::env::remove_var("FILEDROP_JWT_SECRET"),
        }
        match original_path {
            Some(val) => std::env::set_var("FILEDROP_STORAGE_PATH", val),
            None => std::env::remove_var("FILEDROP_STORAGE_PATH"),
        }
    }

    #[test]
    fn test_validate_requires_secret() {
        let config = Config::default();

        let result = config.validate();
        if let Err(FiledropError::Config(msg)) = result {
            assert!(msg.contains("jwt_secret"));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_validate_chunk_size_floor() {
        let mut config = Config::default();
        config.web.jwt_secret = "secret".to_string();
        config.upload.chunk_size_mb = 1;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_part_limit_below_chunk_size() {
        let mut config = Config::default();
        config.web.jwt_secret = "secret".to_string();
        config.upload.chunk_size_mb = 50;
        config.storage.max_part_size_mb = 10;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_attempts() {
        let mut config = Config::default();
        config.web.jwt_secret = "secret".to_string();
        config.upload.max_attempts = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ok() {
        let mut config = Config::default();
        config.web.jwt_secret = "secret".to_string();

        assert!(config.validate().is_ok());
    }
}
