//! Action log entries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::command::CommandId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutcome {
    Applied,
    Blocked,
    Failed,
}

impl fmt::Display for LogOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Applied => "applied",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
        })
    }
}

/// Which path produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOrigin {
    Validated,
    Undo,
    Redo,
    /// SQL console; bypasses validation.
    RawSql,
    Maintenance,
    System,
}

impl LogOrigin {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::RawSql => "unchecked",
            Self::Maintenance => "maintenance",
            Self::System => "system",
        }
    }
}

impl fmt::Display for LogOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One immutable action log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Strictly increasing within a session, starting at 1.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub origin: LogOrigin,
    pub command_id: Option<CommandId>,
    /// Command description or raw action text.
    pub description: String,
    pub outcome: LogOutcome,
    pub reason: Option<String>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} ({}): {}",
            self.seq,
            self.timestamp.format("%H:%M:%S"),
            self.outcome,
            self.origin,
            self.description
        )?;
        if let Some(reason) = &self.reason {
            write!(f, " - {reason}")?;
        }
        Ok(())
    }
}
