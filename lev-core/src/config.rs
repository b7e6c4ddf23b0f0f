//! Configuration types for Lev

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default number of log lines returned by a status tail
pub const DEFAULT_TAIL_LINES: usize = 50;

/// Environment variable naming an extra configuration file
pub const CONFIG_PATH_ENV: &str = "LEV_CONFIG_PATH";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A provider failed or a value had the wrong shape
    #[error("Failed to load configuration: {0}")]
    Load(#[source] Box<figment::Error>),

    /// A value was well-formed but not acceptable
    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

/// Main configuration for Lev
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LevConfig {
    /// Process supervisor configuration
    pub supervisor: SupervisorConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Process supervisor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Directory holding process records and captured logs
    pub state_dir: PathBuf,

    /// Lines returned when a status tail is requested without a count
    pub default_tail_lines: usize,

    /// Shell used to run commands (invoked as `<shell> -c <command>`)
    pub shell: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            default_tail_lines: DEFAULT_TAIL_LINES,
            shell: "sh".to_string(),
        }
    }
}

/// `<data-local-dir>/lev`, or `./.lev` when the platform has none
pub fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("lev"))
        .unwrap_or_else(|| PathBuf::from(".lev"))
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LevConfig {
    /// Layered configuration sources.
    ///
    /// Later layers win:
    /// 1. Built-in defaults
    /// 2. `lev.toml` in the working directory
    /// 3. The file named by `LEV_CONFIG_PATH`, then `explicit` if given
    /// 4. `LEV_`-prefixed environment variables, `__` separating sections
    ///    (`LEV_SUPERVISOR__SHELL=bash`)
    pub fn figment(explicit: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(LevConfig::default()))
            .merge(Toml::file("lev.toml"));

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            figment = figment.merge(Toml::file(path));
        }

        if let Some(path) = explicit {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(
            Env::prefixed("LEV_")
                .ignore(&["CONFIG_PATH", "PROCESS_ID"])
                .split("__"),
        )
    }

    /// Load configuration from file and environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is malformed or a value fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load configuration with an additional explicit file layered on top.
    pub fn load_with(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config: LevConfig = Self::figment(explicit).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path only.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: LevConfig = Figment::from(Serialized::defaults(LevConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supervisor.shell.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "supervisor.shell",
                reason: "must not be empty".to_string(),
            });
        }

        if self.supervisor.default_tail_lines == 0 {
            return Err(ConfigError::Invalid {
                field: "supervisor.default_tail_lines",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.supervisor.state_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "supervisor.state_dir",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}
