//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mcp::protocol::{MCP_PROTOCOL_VERSION, SERVER_NAME};

/// Environment variable that overrides the reported server version.
pub const VERSION_ENV: &str = "QUERY_SERVER_VERSION";

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Server identity.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.protocol_version.trim().is_empty() {
            return Err(invalid("server.protocol_version must not be empty"));
        }
        if self.database.max_rows == 0 {
            return Err(invalid("database.max_rows must be greater than 0"));
        }
        if self.limits.tool_timeout_secs == 0 {
            return Err(invalid("limits.tool_timeout_secs must be greater than 0"));
        }
        if self.limits.max_message_bytes == 0 {
            return Err(invalid("limits.max_message_bytes must be greater than 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }
        Ok(())
    }

    /// Returns the version to report to clients.
    ///
    /// `QUERY_SERVER_VERSION` wins over `server.version`, which wins over the
    /// version this binary was built as.
    #[must_use]
    pub fn server_version(&self) -> String {
        self.version_from(std::env::var(VERSION_ENV).ok())
    }

    fn version_from(&self, env: Option<String>) -> String {
        env.filter(|v| !v.trim().is_empty())
            .or_else(|| self.server.version.clone())
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError {
        message: message.to_string(),
    }
}

/// Server identity reported by `initialize`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Server name.
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Server version; see [`Config::server_version`].
    #[serde(default)]
    pub version: Option<String>,

    /// Protocol version to negotiate.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            version: None,
            protocol_version: default_protocol_version(),
        }
    }
}

fn default_server_name() -> String {
    SERVER_NAME.to_string()
}

fn default_protocol_version() -> String {
    MCP_PROTOCOL_VERSION.to_string()
}

/// Database settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file. Can be overridden with `--database`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Maximum number of rows a query returns.
    /// Default: 1000
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_rows: default_max_rows(),
        }
    }
}

const fn default_max_rows() -> usize {
    1000
}

/// Resource limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Seconds a tool call may run before it is reported as failed.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Largest accepted input frame in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl LimitsConfig {
    /// Returns the tool timeout as a [`Duration`].
    #[must_use]
    pub const fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

const fn default_tool_timeout_secs() -> u64 {
    30
}

const fn default_max_message_bytes() -> usize {
    1024 * 1024
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (text, json).
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.name, "query-server-mcp");
        assert_eq!(config.server.protocol_version, "2024-11-05");
        assert!(config.database.path.is_none());
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "server": {
                "name": "analytics",
                "version": "2.0.0",
                "protocol_version": "2025-03-26"
            },
            "database": {
                "path": "/var/lib/analytics.sqlite",
                "max_rows": 50
            },
            "limits": {
                "tool_timeout_secs": 5,
                "max_message_bytes": 4096
            },
            "logging": {
                "level": "debug",
                "format": "json"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.name, "analytics");
        assert_eq!(config.server.version.as_deref(), Some("2.0.0"));
        assert_eq!(config.server.protocol_version, "2025-03-26");
        assert_eq!(
            config.database.path,
            Some(PathBuf::from("/var/lib/analytics.sqlite"))
        );
        assert_eq!(config.database.max_rows, 50);
        assert_eq!(config.limits.tool_timeout(), Duration::from_secs(5));
        assert_eq!(config.limits.max_message_bytes, 4096);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn section_defaults() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.tool_timeout_secs, 30);
        assert_eq!(limits.max_message_bytes, 1_048_576);
        assert_eq!(DatabaseConfig::default().max_rows, 1000);

        let logging = LoggingConfig::default();
        assert_eq!(logging.level, "warn");
        assert_eq!(logging.format, LogFormat::Text);
    }

    #[test]
    fn reject_invalid_log_level() {
        let json = r#"{ "logging": { "level": "loud" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn reject_invalid_log_format() {
        let json = r#"{ "logging": { "format": "xml" } }"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }

    #[test]
    fn reject_zero_limits() {
        for json in [
            r#"{ "database": { "max_rows": 0 } }"#,
            r#"{ "limits": { "tool_timeout_secs": 0 } }"#,
            r#"{ "limits": { "max_message_bytes": 0 } }"#,
            r#"{ "server": { "protocol_version": " " } }"#,
        ] {
            let config: Config = serde_json::from_str(json).unwrap();
            assert!(config.validate().is_err(), "{json}");
        }
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());

        let nested = r#"{ "database": { "file": "x.sqlite" } }"#;
        assert!(serde_json::from_str::<Config>(nested).is_err());
    }

    #[test]
    fn version_resolution_order() {
        let mut config = Config::default();
        assert_eq!(config.version_from(None), env!("CARGO_PKG_VERSION"));

        config.server.version = Some("2.0.0".into());
        assert_eq!(config.version_from(None), "2.0.0");
        assert_eq!(config.version_from(Some("3.1.4".into())), "3.1.4");
        assert_eq!(config.version_from(Some(String::new())), "2.0.0");
    }
}
