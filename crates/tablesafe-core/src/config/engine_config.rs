//! Engine configuration.

use serde::{Deserialize, Serialize};

/// How the inverse of a ColumnAdd removes the column again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnRemoval {
    /// Native `DROP COLUMN` when the linked SQLite supports it, else rebuild.
    #[default]
    Auto,
    /// Always native `DROP COLUMN`; block when unsupported.
    Native,
    /// Always a full table rebuild.
    Rebuild,
}

/// Configuration for the connection and the transaction executor.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite busy timeout in milliseconds. Default: 5000.
    pub busy_timeout_ms: Option<u32>,
    /// Enforce foreign keys on the session connection. Default: true.
    pub foreign_keys: Option<bool>,
    /// Rows per batch for captured-row restores and table rebuilds. Default: 500.
    pub batch_size: Option<usize>,
    /// Strategy for removing a column during ColumnAdd undo.
    pub column_removal: ColumnRemoval,
    /// Use WAL journaling for file databases. Default: true.
    pub journal_wal: Option<bool>,
}

impl EngineConfig {
    /// Returns the effective busy timeout, defaulting to 5000ms.
    pub fn effective_busy_timeout_ms(&self) -> u32 {
        self.busy_timeout_ms.unwrap_or(5000)
    }

    /// Returns whether foreign keys are enforced, defaulting to true.
    pub fn effective_foreign_keys(&self) -> bool {
        self.foreign_keys.unwrap_or(true)
    }

    /// Returns the effective batch size, defaulting to 500.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.unwrap_or(500).max(1)
    }

    /// Returns whether WAL is used for file databases, defaulting to true.
    pub fn effective_journal_wal(&self) -> bool {
        self.journal_wal.unwrap_or(true)
    }
}
