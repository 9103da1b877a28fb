//! Configuration management for dailylog

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::logging::{Level, LoggerOptions};

/// Logging configuration as stored in `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Directory for daily log files; `~` is expanded
    #[serde(default = "default_directory")]
    pub directory: String,

    /// Minimum level: "trace", "debug", "info", "warn" or "error" (unknown means info)
    #[serde(default = "default_level")]
    pub level: String,

    /// Write JSON records to the log file instead of plain text
    #[serde(default)]
    pub structured: bool,

    /// Mirror records to stdout
    #[serde(default = "default_true")]
    pub console: bool,

    /// Compress each day's file once the date rolls over
    #[serde(default = "default_true")]
    pub compress: bool,
}

fn default_directory() -> String {
    logs_dir().to_string_lossy().into_owned()
}

fn default_level() -> String {
    Level::default().as_str().to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            level: default_level(),
            structured: false,
            console: true,
            compress: true,
        }
    }
}

impl LoggingConfig {
    /// Load configuration from the default path, or return defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from `path`, or return defaults if the file does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to `path`, creating its parent directory
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Log directory with `~` expanded
    pub fn directory(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.directory).into_owned())
    }

    /// Convert to logger options
    pub fn logger_options(&self) -> LoggerOptions {
        LoggerOptions::new()
            .directory(self.directory())
            .level(&self.level)
            .structured(self.structured)
            .console(self.console)
            .compress(self.compress)
    }
}

/// Get the base configuration directory (~/.dailylog)
/// Falls back to ./.dailylog if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    try_config_dir().unwrap_or_else(|| PathBuf::from(".dailylog"))
}

/// Try to get the base configuration directory, returning None if home dir is unavailable
pub fn try_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".dailylog"))
}

/// Get the path to the config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the path to the default logs directory
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}
