//! Action log and tracing configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Tracing filter directive. Default: "info". `TABLESAFE_LOG` overrides it.
    pub filter: Option<String>,
    /// Optional JSON-lines file mirroring the action log.
    pub file: Option<PathBuf>,
    /// Channel capacity per log subscriber. Default: 1024.
    pub subscriber_capacity: Option<usize>,
}

impl LogConfig {
    /// Returns the effective tracing filter, defaulting to "info".
    pub fn effective_filter(&self) -> &str {
        self.filter.as_deref().unwrap_or("info")
    }

    /// Returns the effective subscriber capacity, defaulting to 1024.
    pub fn effective_subscriber_capacity(&self) -> usize {
        self.subscriber_capacity.unwrap_or(1024)
    }
}
