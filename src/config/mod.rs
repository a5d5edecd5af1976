//! Configuration management for hawkdb
//!
//! This module handles loading, parsing, and validating configuration:
//! - Configuration file (TOML format, `~/.hawkdb/config.toml` by default)
//! - Command-line arguments (applied on top by the CLI layer)
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::export::writers::{BinaryPolicy, SqlDialect};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Export configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Profile store configuration
    #[serde(default)]
    pub profiles: ProfilesConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Maximum wait for a single row, in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Retry once without TLS when the TLS handshake fails
    #[serde(default = "default_ssl_fallback")]
    pub ssl_fallback: bool,
}

/// Export-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Rows per INSERT statement
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// CSV field delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// How CSV handles binary values
    #[serde(default)]
    pub binary: BinaryPolicy,

    /// SQL dialect for INSERT scripts
    #[serde(default)]
    pub dialect: SqlDialect,

    /// Worksheet name for workbook exports
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,

    /// Keep the temporary file of a cancelled export
    #[serde(default)]
    pub keep_partial: bool,

    /// Report progress every N rows
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,

    /// Show a progress spinner in the terminal
    #[serde(default = "default_progress_bar")]
    pub progress_bar: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Profile store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilesConfig {
    /// Path to the profile store file
    #[serde(default = "default_profiles_file")]
    pub file_path: PathBuf,
}

// Default value functions
fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    300
}

fn default_ssl_fallback() -> bool {
    true
}

fn default_batch_size() -> usize {
    500
}

fn default_delimiter() -> char {
    ','
}

fn default_sheet_name() -> String {
    "Data".to_string()
}

fn default_progress_interval() -> u64 {
    1000
}

fn default_progress_bar() -> bool {
    true
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

fn default_profiles_file() -> PathBuf {
    Config::config_dir().join("profiles.toml")
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            ssl_fallback: default_ssl_fallback(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            delimiter: default_delimiter(),
            binary: BinaryPolicy::default(),
            dialect: SqlDialect::default(),
            sheet_name: default_sheet_name(),
            keep_partial: false,
            progress_interval: default_progress_interval(),
            progress_bar: default_progress_bar(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            file_path: default_profiles_file(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory holding hawkdb's configuration and profile store
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hawkdb")
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load configuration from an explicit path or the default location
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to a file
    ///
    /// # Arguments
    /// * `path` - Path where to save the configuration
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Render configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, value: String| -> crate::error::HawkError {
            ConfigError::InvalidValue {
                field: field.to_string(),
                value,
            }
            .into()
        };

        if self.connection.connect_timeout_secs == 0 {
            return Err(invalid("connection.connect_timeout_secs", "0".into()));
        }
        if self.connection.read_timeout_secs == 0 {
            return Err(invalid("connection.read_timeout_secs", "0".into()));
        }
        if self.export.batch_size == 0 {
            return Err(invalid("export.batch_size", "0".into()));
        }
        let d = self.export.delimiter;
        if !d.is_ascii() || d == '"' || d == '\n' || d == '\r' {
            return Err(invalid("export.delimiter", d.to_string()));
        }
        if self.export.sheet_name.trim().is_empty() {
            return Err(invalid("export.sheet_name", self.export.sheet_name.clone()));
        }
        if self.export.progress_interval == 0 {
            return Err(invalid("export.progress_interval", "0".into()));
        }
        Ok(())
    }

    /// Get connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.connect_timeout_secs)
    }

    /// Get per-row read timeout as Duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.read_timeout_secs)
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.connect_timeout_secs, 10);
        assert_eq!(config.export.batch_size, 500);
        assert_eq!(config.export.delimiter, ',');
        assert_eq!(config.export.binary, BinaryPolicy::Reject);
        assert_eq!(config.export.dialect, SqlDialect::Ansi);
        assert!(config.profiles.file_path.ends_with("profiles.toml"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [export]
            batch_size = 100
            dialect = "mysql"
            binary = "base64"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.export.batch_size, 100);
        assert_eq!(config.export.dialect, SqlDialect::MySql);
        assert_eq!(config.export.binary, BinaryPolicy::Base64);
        assert_eq!(config.export.sheet_name, "Data");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.connection.read_timeout_secs, 300);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let err = Config::from_toml("[export\nbatch_size = ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.export.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.export.delimiter = '"';
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.connection.connect_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.export.sheet_name = "Report".to_string();
        config.save(&path).unwrap();

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(Config::load_from_file(Some(&missing)).is_err());
    }

    #[test]
    fn test_connect_timeout() {
        let config = Config::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }
}
