//! Server settings: config file, environment, then command line

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use config::{Config, Environment, File};
use hearth_process::SupervisorConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file or environment could not be read or deserialized
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    /// Settings were read but are unusable
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Everything the server binary needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Listen address
    pub bind: String,
    /// Maximum log level
    pub log_level: String,
    /// Supervisor core settings
    pub supervisor: SupervisorConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            log_level: "info".to_string(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl Settings {
    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.supervisor.console_capacity == 0 {
            return Err(SettingsError::Validation(
                "Console capacity must be greater than 0".to_string(),
            ));
        }
        if self.supervisor.stream_poll_interval_ms == 0 {
            return Err(SettingsError::Validation(
                "Stream poll interval must be greater than 0".to_string(),
            ));
        }
        self.bind_addr()?;
        self.max_level()?;
        Ok(())
    }

    /// Parsed listen address
    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        SocketAddr::from_str(&self.bind).map_err(|e| {
            SettingsError::Validation(format!("Invalid bind address '{}': {e}", self.bind))
        })
    }

    /// Parsed log level
    pub fn max_level(&self) -> Result<Level, SettingsError> {
        Level::from_str(&self.log_level).map_err(|_| {
            SettingsError::Validation(format!(
                "Invalid log level '{}' (expected trace, debug, info, warn or error)",
                self.log_level
            ))
        })
    }
}

/// Layers the settings sources
pub struct SettingsLoader {
    /// Settings file path
    config_path: PathBuf,
    /// Whether a missing file is an error
    required: bool,
    /// Environment prefix
    env_prefix: String,
}

impl SettingsLoader {
    /// Loader reading the per-user config file if it exists
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
            required: false,
            env_prefix: "HEARTH".to_string(),
        }
    }

    /// Loader reading an explicitly named file, which must exist
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: path,
            required: true,
            ..Self::new()
        }
    }

    /// Use another environment prefix
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Default settings file location
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hearth")
            .join("config.toml")
    }

    /// Read file then environment over the built-in defaults
    ///
    /// Environment keys use `__` between levels, e.g.
    /// `HEARTH_SUPERVISOR__CONSOLE_CAPACITY=5000`.
    pub fn load(&self) -> Result<Settings, SettingsError> {
        let config = Config::builder()
            .add_source(File::from(self.config_path.clone()).required(self.required))
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}
