//! Configuration management for promsd.
//!
//! Configuration comes from, in increasing priority:
//! - built-in defaults
//! - `PROMSD__*` environment variables
//! - an optional YAML file
//! - command line flags, applied by the binary on top of the loaded value

use crate::duration::format_duration;
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Output destination meaning "standard output".
pub const STDOUT_DESTINATION: &str = "-";

/// Service advertised by plain HTTP exporters.
pub const HTTP_SERVICE: &str = "_prometheus-http._tcp";

/// Service advertised by HTTPS exporters.
pub const HTTPS_SERVICE: &str = "_prometheus-https._tcp";

/// Environment variable prefix for overrides, e.g. `PROMSD__DISCOVERY__INTERVAL=30s`.
pub const ENV_PREFIX: &str = "PROMSD";

/// Root configuration.
///
/// # Examples
///
/// ```
/// use promsd_core::config::AppConfig;
///
/// let config = AppConfig::from_yaml("discovery:\n  interval: 30s\n").unwrap();
/// config.validate().unwrap();
/// assert_eq!(config.discovery.interval.as_secs(), 30);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Discovery engine settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Where snapshots are written
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::InvalidFormat {
            reason: e.to_string(),
        })
    }

    /// Loads configuration using the `config` crate: environment variables
    /// prefixed with `PROMSD__`, then the file at `path` if one is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("discovery.service_names")
                .with_list_parse_key("discovery.interfaces")
                .try_parsing(true),
        );

        let origin = match path {
            Some(path) => {
                builder = builder.add_source(
                    config::File::from(path)
                        .format(config::FileFormat::Yaml)
                        .required(true),
                );
                path.display().to_string()
            }
            None => "environment".to_string(),
        };

        let config = builder.build().map_err(|e| ConfigError::LoadFailed {
            path: origin,
            reason: e.to_string(),
        })?;

        config
            .try_deserialize()
            .map_err(|e| ConfigError::InvalidFormat {
                reason: e.to_string(),
            })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        self.discovery.validate()?;
        self.output.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Non-fatal configuration problems, for logging once tracing is up.
    pub fn warnings(&self) -> Vec<String> {
        self.discovery.warnings()
    }
}

/// Discovery engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Time between refresh cycles
    #[serde(default = "default_interval", with = "crate::duration::serde")]
    pub interval: Duration,

    /// How long a single query listens for responses
    #[serde(default = "default_query_timeout", with = "crate::duration::serde")]
    pub query_timeout: Duration,

    /// DNS-SD service names queried every cycle
    #[serde(default = "default_service_names")]
    pub service_names: Vec<String>,

    /// Service name whose targets are scraped over HTTPS
    #[serde(default = "default_secure_service")]
    pub secure_service: String,

    /// Network interfaces to query on; empty queries unscoped
    #[serde(default)]
    pub interfaces: Vec<String>,

    /// Drop services without a resolved IPv4 address
    #[serde(default)]
    pub ipv4_only: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            query_timeout: default_query_timeout(),
            service_names: default_service_names(),
            secure_service: default_secure_service(),
            interfaces: Vec::new(),
            ipv4_only: false,
        }
    }
}

impl DiscoveryConfig {
    /// Validates the discovery configuration.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(ConfigError::invalid_value(
                "discovery.interval",
                "must be greater than zero",
            ));
        }

        if self.query_timeout.is_zero() {
            return Err(ConfigError::invalid_value(
                "discovery.query_timeout",
                "must be greater than zero",
            ));
        }

        if self.service_names.is_empty() {
            return Err(ConfigError::invalid_value(
                "discovery.service_names",
                "at least one service name must be configured",
            ));
        }

        if self.service_names.iter().any(|n| n.trim().is_empty()) {
            return Err(ConfigError::invalid_value(
                "discovery.service_names",
                "service names cannot be empty",
            ));
        }

        if self.secure_service.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "discovery.secure_service",
                "cannot be empty",
            ));
        }

        if self.interfaces.iter().any(|i| i.trim().is_empty()) {
            return Err(ConfigError::invalid_value(
                "discovery.interfaces",
                "interface names cannot be empty",
            ));
        }

        Ok(())
    }

    /// Settings that are valid but probably not what the user wants.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.query_timeout > self.interval {
            warnings.push(format!(
                "query timeout {} exceeds refresh interval {}; cycles will run back to back",
                format_duration(self.query_timeout),
                format_duration(self.interval)
            ));
        }
        warnings
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_query_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_service_names() -> Vec<String> {
    vec![HTTP_SERVICE.to_string(), HTTPS_SERVICE.to_string()]
}

fn default_secure_service() -> String {
    HTTPS_SERVICE.to_string()
}

/// Output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// File to write target groups to, or `-` for standard output
    #[serde(default = "default_output_path")]
    pub path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
        }
    }
}

impl OutputConfig {
    /// Returns the output file, or `None` for standard output.
    pub fn file(&self) -> Option<PathBuf> {
        if self.path == STDOUT_DESTINATION {
            None
        } else {
            Some(PathBuf::from(&self.path))
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "output.path",
                "use '-' for standard output",
            ));
        }
        Ok(())
    }
}

fn default_output_path() -> String {
    STDOUT_DESTINATION.to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Silence the mDNS transport's own logging
    #[serde(default = "default_true")]
    pub quiet_transport: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            quiet_transport: true,
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::invalid_value(
                "logging.level",
                format!("Invalid log level: {}", self.level),
            )
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.parse_level().map(|_| ())
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}
