//! Layered configuration for medchain.
//!
//! Sources (highest wins):
//! 1. Environment variables (`MEDCHAIN_*`, `__` between sections),
//!    e.g. `MEDCHAIN_STORE__PATH=/var/lib/medchain/ledger.db`
//! 2. A TOML file (`medchain.toml` in the working directory, or an explicit path)
//! 3. Built-in defaults

use crate::service::DEFAULT_MAX_UPDATE_ATTEMPTS;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "medchain.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Figment extraction or merge error.
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    /// A configuration field has an invalid value.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite database file
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("medchain.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackingConfig {
    /// Read-append-write attempts before giving up on a contended batch
    #[serde(default = "default_max_update_attempts")]
    pub max_update_attempts: u32,
}

const fn default_max_update_attempts() -> u32 {
    DEFAULT_MAX_UPDATE_ATTEMPTS
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_update_attempts: default_max_update_attempts(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `MEDCHAIN_LOG` is unset
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

// ============================================================================
// MEDCHAIN CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MedchainConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MedchainConfig {
    /// Defaults, then `medchain.toml` if present, then `MEDCHAIN_*`
    pub fn load() -> Result<Self, ConfigError> {
        Self::extract(Self::figment(Path::new(DEFAULT_CONFIG_FILE)))
    }

    /// Same as [`load`](Self::load) with an explicit TOML file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::extract(Self::figment(path))
    }

    /// Provider chain; public so tests can layer extra providers on top
    pub fn figment(config_file: &Path) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if config_file.exists() {
            figment = figment.merge(Toml::file(config_file));
        }

        figment.merge(Env::prefixed("MEDCHAIN_").split("__"))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tracking.max_update_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tracking.max_update_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
