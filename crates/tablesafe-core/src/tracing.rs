//! Tracing subscriber setup.
//!
//! The engine only emits `tracing` events; installing a subscriber is the
//! host application's choice. `init_tracing` is idempotent.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;
use crate::errors::ConfigError;

/// Environment variable that overrides the configured filter.
pub const LOG_ENV_VAR: &str = "TABLESAFE_LOG";

static INIT: OnceLock<()> = OnceLock::new();

/// Install a global fmt subscriber filtered by `TABLESAFE_LOG` or `config.filter`.
pub fn init_tracing(config: &LogConfig) -> Result<(), ConfigError> {
    if INIT.get().is_some() {
        return Ok(());
    }

    let filter = match std::env::var(LOG_ENV_VAR) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(config.effective_filter()),
    }
    .map_err(|e| ConfigError::Tracing(e.to_string()))?;

    // A subscriber installed by the host first is not an error.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    let _ = INIT.set(());
    Ok(())
}
