//! Layered configuration for the `kmsi` binary.
//!
//! Sources, highest priority first:
//! 1. Environment variables with the `KMSI_` prefix (`KMSI_DATABASE`, `KMSI_TIMEZONE`, ...)
//! 2. The TOML file given by `--config`, or `kmsi.toml` in the working directory
//! 3. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use chrono_tz::Tz;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "kmsi.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    #[error("Configuration file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

fn default_database() -> PathBuf {
    PathBuf::from("kmsi.sqlite3")
}

fn default_timezone() -> String {
    "UTC".to_string()
}

const fn default_busy_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// SQLite database file.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// IANA timezone of the school; decides which civil date is "today".
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// How long a write waits for another writer before giving up.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            timezone: default_timezone(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Config {
    /// Load the layered configuration. A file named explicitly must exist; the
    /// default `kmsi.toml` is optional.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = file {
            if !path.is_file() {
                return Err(ConfigError::MissingFile(path.to_path_buf()));
            }
        }
        let config: Self = Self::figment(file).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment(file: Option<&Path>) -> Figment {
        let path = file.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("KMSI_"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.tz()?;
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                field: "timezone".to_string(),
                reason: format!("'{}' is not an IANA timezone", self.timezone),
            })
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// The current wall-clock time at the school.
    pub fn local_now(&self) -> Result<NaiveDateTime, ConfigError> {
        Ok(chrono::Utc::now().with_timezone(&self.tz()?).naive_local())
    }
}
