//! Configuration module for r2box.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, validation, defaults, and a builder pattern for
//! programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for r2box.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub broker: BrokerConfig,
    pub cache: CacheConfig,
    pub transfer: TransferConfig,
    pub logging: LoggingConfig,
    pub credentials: CredentialsConfig,
    pub supervisor: SupervisorConfig,
}

/// HTTP Broker (`r2box-broker`) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Loopback address the broker binds to. Never anything but a loopback
    /// address — the Supervisor and the CORS allow-list both assume it.
    pub bind_address: String,
    /// Port to bind, `0` for an OS-assigned ephemeral port (the Supervisor's
    /// default mode of operation).
    pub port: u16,
    /// Allowed CORS origins. Only `http://localhost:*` / `http://127.0.0.1:*`
    /// patterns are ever honored regardless of what this list contains.
    pub cors_allowed_origins: Vec<String>,
    /// Maximum request/response body size in bytes before the broker
    /// rejects a payload outright (default 5 GiB).
    pub body_limit_bytes: u64,
    /// Seconds the broker drains in-flight requests for before aborting on
    /// shutdown.
    pub shutdown_drain_secs: u64,
}

/// Folder Cache (`r2box-cache`) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached listing pages before LRU eviction kicks in.
    pub capacity: usize,
    /// Seconds before a cached entry expires and is evicted on next access.
    pub ttl_secs: i64,
    /// Seconds before a cached entry is considered stale (but still valid).
    pub staleness_secs: i64,
}

/// Transfer Engine (`r2box-transfer`) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Maximum concurrent uploads across all buckets.
    pub max_concurrent_uploads: usize,
    /// Maximum concurrent downloads across all buckets.
    pub max_concurrent_downloads: usize,
    /// Maximum concurrent delete passes per bucket (serialized per bucket).
    pub max_concurrent_deletes_per_bucket: usize,
    /// Keys per `deleteBatch` call to the provider.
    pub delete_batch_size: usize,
    /// Maximum automatic retry attempts when `auto_retry_on_failure` is set.
    pub max_retry_attempts: u32,
    /// Whether a FAILED task is automatically retried.
    pub auto_retry_on_failure: bool,
    /// Seconds before a single Provider Client request is abandoned.
    pub request_deadline_secs: u64,
    /// Seconds before an entire resource operation (e.g. a whole download)
    /// is abandoned.
    pub resource_deadline_secs: u64,
    /// How many completed tasks to retain (FIFO eviction beyond this).
    pub retain_completed: usize,
    /// How many failed tasks to retain (FIFO eviction beyond this).
    pub retain_failed: usize,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Optional log file; `None` logs to stderr only.
    pub file: Option<PathBuf>,
    /// Emit structured JSON log lines instead of the human-readable format.
    pub json: bool,
}

/// Credential Store (`r2box-credentials`) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Path to the on-disk credentials file
    /// (`~/.cloudflare-r2-object-storage-browser/settings.json` by default).
    pub store_path: PathBuf,
    /// Prefer an OS keychain backend over the file layout when available.
    pub prefer_keychain: bool,
}

/// Supervisor (`r2box-supervisor`) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Seconds to wait for a graceful `/shutdown` before a hard kill.
    pub shutdown_timeout_secs: u64,
    /// Maximum buffered log lines kept for subscribers (drop-oldest beyond
    /// this, matching the broadcast channel's own overflow behavior).
    pub log_buffer_lines: usize,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Applies the broker's documented environment-variable overrides
    /// (spec.md §6): `CORS_ALLOWED_ORIGINS` (comma list), `PORT` (`0` for
    /// OS-assigned), `LOG_LEVEL`. Each is independently optional; an unset
    /// or unparsable variable leaves the loaded/default config field
    /// untouched rather than erroring.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(origins) = std::env::var("CORS_ALLOWED_ORIGINS") {
            self.broker.cors_allowed_origins =
                origins.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.trim().parse::<u16>() {
                self.broker.port = port;
            }
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level.trim().to_ascii_lowercase();
        }
        self
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/r2box/config.yaml` on Linux.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("r2box")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            cors_allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
                "http://localhost:8080".to_string(),
            ],
            body_limit_bytes: 5 * 1024 * 1024 * 1024,
            shutdown_drain_secs: 3,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl_secs: 5 * 60,
            staleness_secs: 2 * 60,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrent_uploads: 3,
            max_concurrent_downloads: 5,
            max_concurrent_deletes_per_bucket: 1,
            delete_batch_size: 1000,
            max_retry_attempts: 1,
            auto_retry_on_failure: false,
            request_deadline_secs: 30,
            resource_deadline_secs: 300,
            retain_completed: 50,
            retain_failed: 50,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            store_path: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join(".cloudflare-r2-object-storage-browser")
                .join("settings.json"),
            prefer_keychain: true,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: 3,
            log_buffer_lines: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"cache.ttl_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- broker ---
        if !self.broker.bind_address.starts_with("127.") && self.broker.bind_address != "localhost"
        {
            errors.push(ValidationError {
                field: "broker.bind_address".into(),
                message: format!(
                    "must be a loopback address, got '{}'",
                    self.broker.bind_address
                ),
            });
        }
        if self.broker.body_limit_bytes == 0 {
            errors.push(ValidationError {
                field: "broker.body_limit_bytes".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.broker.cors_allowed_origins.is_empty() {
            errors.push(ValidationError {
                field: "broker.cors_allowed_origins".into(),
                message: "must contain at least one origin".into(),
            });
        }
        for origin in &self.broker.cors_allowed_origins {
            if !is_loopback_origin(origin) {
                errors.push(ValidationError {
                    field: "broker.cors_allowed_origins".into(),
                    message: format!("non-loopback origin '{origin}' will be dropped, not honored"),
                });
            }
        }

        // --- cache ---
        if self.cache.capacity == 0 {
            errors.push(ValidationError {
                field: "cache.capacity".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.cache.ttl_secs <= 0 {
            errors.push(ValidationError {
                field: "cache.ttl_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.cache.staleness_secs <= 0 || self.cache.staleness_secs > self.cache.ttl_secs {
            errors.push(ValidationError {
                field: "cache.staleness_secs".into(),
                message: "must be greater than 0 and not exceed ttl_secs".into(),
            });
        }

        // --- transfer ---
        if self.transfer.max_concurrent_uploads == 0 {
            errors.push(ValidationError {
                field: "transfer.max_concurrent_uploads".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.transfer.max_concurrent_downloads == 0 {
            errors.push(ValidationError {
                field: "transfer.max_concurrent_downloads".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.transfer.max_concurrent_deletes_per_bucket == 0 {
            errors.push(ValidationError {
                field: "transfer.max_concurrent_deletes_per_bucket".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.transfer.delete_batch_size == 0 || self.transfer.delete_batch_size > 1000 {
            errors.push(ValidationError {
                field: "transfer.delete_batch_size".into(),
                message: "must be in range 1..=1000".into(),
            });
        }
        if self.transfer.request_deadline_secs == 0 {
            errors.push(ValidationError {
                field: "transfer.request_deadline_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.transfer.resource_deadline_secs < self.transfer.request_deadline_secs {
            errors.push(ValidationError {
                field: "transfer.resource_deadline_secs".into(),
                message: "must be >= request_deadline_secs".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        // --- supervisor ---
        if self.supervisor.shutdown_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "supervisor.shutdown_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.supervisor.log_buffer_lines == 0 {
            errors.push(ValidationError {
                field: "supervisor.log_buffer_lines".into(),
                message: "must be greater than 0".into(),
            });
        }

        errors
    }
}

/// Whether `origin` matches `http://localhost:*` or `http://127.0.0.1:*`.
/// The only shapes the broker's CORS layer ever honors, regardless of what
/// an operator puts in `CORS_ALLOWED_ORIGINS`.
#[must_use]
pub fn is_loopback_origin(origin: &str) -> bool {
    origin.starts_with("http://localhost:")
        || origin == "http://localhost"
        || origin.starts_with("http://127.0.0.1:")
        || origin == "http://127.0.0.1"
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use r2box_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .broker_port(9090)
///     .cache_capacity(200)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    #[must_use]
    pub fn broker_bind_address(mut self, address: impl Into<String>) -> Self {
        self.config.broker.bind_address = address.into();
        self
    }

    #[must_use]
    pub fn broker_port(mut self, port: u16) -> Self {
        self.config.broker.port = port;
        self
    }

    #[must_use]
    pub fn broker_cors_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.config.broker.cors_allowed_origins = origins;
        self
    }

    #[must_use]
    pub fn broker_body_limit_bytes(mut self, bytes: u64) -> Self {
        self.config.broker.body_limit_bytes = bytes;
        self
    }

    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache.capacity = capacity;
        self
    }

    #[must_use]
    pub fn cache_ttl_secs(mut self, secs: i64) -> Self {
        self.config.cache.ttl_secs = secs;
        self
    }

    #[must_use]
    pub fn cache_staleness_secs(mut self, secs: i64) -> Self {
        self.config.cache.staleness_secs = secs;
        self
    }

    #[must_use]
    pub fn transfer_max_concurrent_uploads(mut self, n: usize) -> Self {
        self.config.transfer.max_concurrent_uploads = n;
        self
    }

    #[must_use]
    pub fn transfer_max_concurrent_downloads(mut self, n: usize) -> Self {
        self.config.transfer.max_concurrent_downloads = n;
        self
    }

    #[must_use]
    pub fn transfer_auto_retry_on_failure(mut self, auto_retry: bool) -> Self {
        self.config.transfer.auto_retry_on_failure = auto_retry;
        self
    }

    #[must_use]
    pub fn transfer_max_retry_attempts(mut self, n: u32) -> Self {
        self.config.transfer.max_retry_attempts = n;
        self
    }

    #[must_use]
    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    #[must_use]
    pub fn logging_file(mut self, file: PathBuf) -> Self {
        self.config.logging.file = Some(file);
        self
    }

    #[must_use]
    pub fn credentials_store_path(mut self, path: PathBuf) -> Self {
        self.config.credentials.store_path = path;
        self
    }

    #[must_use]
    pub fn supervisor_shutdown_timeout_secs(mut self, secs: u64) -> Self {
        self.config.supervisor.shutdown_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }

    /// Builds and validates; returns the accumulated errors instead of a
    /// `Config` if validation fails.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let errors = self.config.validate();
        if errors.is_empty() {
            Ok(self.config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn default_broker_binds_to_loopback_with_ephemeral_port() {
        let config = Config::default();
        assert_eq!(config.broker.bind_address, "127.0.0.1");
        assert_eq!(config.broker.port, 0);
    }

    #[test]
    fn default_cache_matches_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.capacity, 100);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.cache.staleness_secs, 120);
    }

    #[test]
    fn default_transfer_queue_limits_match_spec() {
        let config = Config::default();
        assert_eq!(config.transfer.max_concurrent_uploads, 3);
        assert_eq!(config.transfer.max_concurrent_downloads, 5);
        assert_eq!(config.transfer.delete_batch_size, 1000);
        assert_eq!(config.transfer.retain_completed, 50);
        assert_eq!(config.transfer.retain_failed, 50);
    }

    #[test]
    fn validate_rejects_non_loopback_bind_address() {
        let config = ConfigBuilder::new().broker_bind_address("0.0.0.0").build();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.field == "broker.bind_address"));
    }

    #[test]
    fn validate_rejects_non_loopback_cors_origin() {
        let config = ConfigBuilder::new()
            .broker_cors_allowed_origins(vec!["https://evil.example.com".to_string()])
            .build();
        let errors = config.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "broker.cors_allowed_origins"));
    }

    #[test]
    fn validate_rejects_zero_body_limit() {
        let config = ConfigBuilder::new().broker_body_limit_bytes(0).build();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.field == "broker.body_limit_bytes"));
    }

    #[test]
    fn validate_rejects_staleness_exceeding_ttl() {
        let config = ConfigBuilder::new()
            .cache_ttl_secs(60)
            .cache_staleness_secs(120)
            .build();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.field == "cache.staleness_secs"));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let config = ConfigBuilder::new().logging_level("verbose").build();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.field == "logging.level"));
    }

    #[test]
    fn is_loopback_origin_accepts_localhost_and_127_0_0_1() {
        assert!(is_loopback_origin("http://localhost:3000"));
        assert!(is_loopback_origin("http://127.0.0.1:8080"));
        assert!(!is_loopback_origin("https://example.com"));
        assert!(!is_loopback_origin("http://0.0.0.0:3000"));
    }

    #[test]
    fn builder_overrides_apply() {
        let config = ConfigBuilder::new()
            .broker_port(9090)
            .cache_capacity(200)
            .transfer_max_concurrent_uploads(10)
            .logging_level("debug")
            .build();

        assert_eq!(config.broker.port, 9090);
        assert_eq!(config.cache.capacity, 200);
        assert_eq!(config.transfer.max_concurrent_uploads, 10);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn build_validated_rejects_invalid_config() {
        let result = ConfigBuilder::new().logging_level("noisy").build_validated();
        assert!(result.is_err());
    }

    #[test]
    fn load_parses_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "broker:\n  bind_address: 127.0.0.1\n  port: 7000\n  cors_allowed_origins: []\n  body_limit_bytes: 1024\n  shutdown_drain_secs: 3\ncache:\n  capacity: 50\n  ttl_secs: 300\n  staleness_secs: 60\ntransfer:\n  max_concurrent_uploads: 3\n  max_concurrent_downloads: 5\n  max_concurrent_deletes_per_bucket: 1\n  delete_batch_size: 1000\n  max_retry_attempts: 1\n  auto_retry_on_failure: false\n  request_deadline_secs: 30\n  resource_deadline_secs: 300\n  retain_completed: 50\n  retain_failed: 50\nlogging:\n  level: info\n  file: null\n  json: false\ncredentials:\n  store_path: /tmp/settings.json\n  prefer_keychain: false\nsupervisor:\n  shutdown_timeout_secs: 3\n  log_buffer_lines: 1000\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.broker.port, 7000);
        assert_eq!(config.cache.capacity, 50);
    }

    #[test]
    fn load_or_default_falls_back_on_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/path/config.yaml"));
        assert_eq!(config.broker.port, 0);
    }

    /// Serializes the env-override tests below; `std::env::set_var` is
    /// process-global and the test binary runs tests concurrently.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn env_overrides_apply_on_top_of_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("CORS_ALLOWED_ORIGINS", "http://localhost:4000, http://127.0.0.1:5000");
        std::env::set_var("PORT", "9999");
        std::env::set_var("LOG_LEVEL", "DEBUG");

        let config = Config::default().with_env_overrides();

        assert_eq!(
            config.broker.cors_allowed_origins,
            vec!["http://localhost:4000".to_string(), "http://127.0.0.1:5000".to_string()]
        );
        assert_eq!(config.broker.port, 9999);
        assert_eq!(config.logging.level, "debug");

        std::env::remove_var("CORS_ALLOWED_ORIGINS");
        std::env::remove_var("PORT");
        std::env::remove_var("LOG_LEVEL");
    }

    #[test]
    fn unset_env_overrides_leave_config_untouched() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("CORS_ALLOWED_ORIGINS");
        std::env::remove_var("PORT");
        std::env::remove_var("LOG_LEVEL");

        let config = Config::default().with_env_overrides();
        let default = Config::default();
        assert_eq!(config.broker.cors_allowed_origins, default.broker.cors_allowed_origins);
        assert_eq!(config.broker.port, default.broker.port);
        assert_eq!(config.logging.level, default.logging.level);
    }

    #[test]
    fn unparsable_port_is_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("PORT", "not-a-port");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.broker.port, Config::default().broker.port);
        std::env::remove_var("PORT");
    }
}
