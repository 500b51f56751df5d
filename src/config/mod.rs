//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! 1. Path given as the first CLI argument (must exist)
//! 2. Default location, used only if the file is there:
//!    - **Linux/macOS:** `~/.query-server-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.query-server-mcp\config.json`
//!
//! With neither, built-in defaults apply.

mod settings;

pub use settings::{
    Config, DatabaseConfig, LimitsConfig, LogFormat, LoggingConfig, ServerConfig, VERSION_ENV,
};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.query-server-mcp/`
/// - **Windows:** `%USERPROFILE%\.query-server-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".query-server-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and parses the configuration file.
///
/// If `path` is `None`, the default location is tried and built-in defaults
/// are used when no file is there.
///
/// # Errors
///
/// Returns an error if:
/// - An explicit `path` does not exist
/// - The file cannot be read
/// - The JSON is malformed
/// - A field is unknown or invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path().filter(|p| p.exists()) {
            Some(p) => p,
            None => return Ok(Config::default()),
        },
    };

    if !config_path.exists() {
        return Err(ConfigError::NotFound { path: config_path });
    }

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    config.validate()?;

    Ok(config)
}
