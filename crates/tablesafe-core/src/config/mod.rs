//! Configuration for an editor session, loaded from `tablesafe.toml`.

pub mod engine_config;
pub mod history_config;
pub mod log_config;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use engine_config::{ColumnRemoval, EngineConfig};
pub use history_config::HistoryConfig;
pub use log_config::LogConfig;

use crate::errors::ConfigError;

/// Top-level configuration aggregating all subsystem configs.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TableSafeConfig {
    pub engine: EngineConfig,
    pub history: HistoryConfig,
    pub log: LogConfig,
}

impl TableSafeConfig {
    /// Load config from a TOML string, falling back to defaults for missing fields.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Reject values that would make the engine misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.batch_size == Some(0) {
            return Err(ConfigError::Invalid {
                field: "engine.batch_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.history.max_depth == Some(0) {
            return Err(ConfigError::Invalid {
                field: "history.max_depth".to_string(),
                reason: "must be at least 1 (omit for unbounded)".to_string(),
            });
        }
        if self.log.subscriber_capacity == Some(0) {
            return Err(ConfigError::Invalid {
                field: "log.subscriber_capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
