//! Undo/redo history configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum undo depth. Oldest commands are evicted past this. Default: unbounded.
    pub max_depth: Option<usize>,
}
