//! Results of validation, application and history replay.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::command::{CommandId, MutationPlan};
use crate::errors::EngineError;

/// Why the validator refused a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockReason {
    NoPrimaryKey { table: String },
    AmbiguousRow { table: String, matches: u64 },
    Unsupported { capability: String },
    Irreversible { detail: String },
    AmbiguousTypeConversion { column: String, detail: String },
    InvalidRequest { detail: String },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPrimaryKey { table } => write!(f, "no primary key (table {table})"),
            Self::AmbiguousRow { table, matches } => {
                write!(f, "ambiguous row ({matches} rows of {table} match the selection)")
            }
            Self::Unsupported { capability } => write!(f, "unsupported: {capability}"),
            Self::Irreversible { detail } => write!(f, "irreversible: {detail}"),
            Self::AmbiguousTypeConversion { column, detail } => {
                write!(f, "ambiguous type conversion: {column}: {detail}")
            }
            Self::InvalidRequest { detail } => write!(f, "invalid request: {detail}"),
        }
    }
}

/// Validator verdict. `Allow` carries the fully specified plan.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Allow(Box<MutationPlan>),
    Block(BlockReason),
}

impl ValidationResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rollback", content = "detail", rename_all = "snake_case")]
pub enum RollbackReason {
    /// Database state no longer matches what the action was built against.
    PreconditionFailed(String),
    Cancelled,
    /// A statement failed; SQLite's message verbatim.
    Failed(String),
}

impl fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreconditionFailed(detail) => write!(f, "precondition failed: {detail}"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    Committed,
    RolledBack(RollbackReason),
}

impl ApplyResult {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }

    pub fn into_result(self) -> Result<(), EngineError> {
        match self {
            Self::Committed => Ok(()),
            Self::RolledBack(RollbackReason::PreconditionFailed(detail)) => {
                Err(EngineError::PreconditionFailed { detail })
            }
            Self::RolledBack(RollbackReason::Cancelled) => Err(EngineError::Cancelled),
            Self::RolledBack(RollbackReason::Failed(message)) => {
                Err(EngineError::Transaction { message })
            }
        }
    }
}

/// What `request_mutation` reports back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Executed(ApplyResult),
    Blocked(BlockReason),
}

impl MutationOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Executed(ApplyResult::Committed))
    }

    /// Collapse into the error taxonomy.
    pub fn into_result(self) -> Result<(), EngineError> {
        match self {
            Self::Executed(result) => result.into_result(),
            Self::Blocked(reason) => Err(EngineError::ValidationBlocked { reason }),
        }
    }
}

/// Result of `undo` / `redo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOutcome {
    EmptyHistory,
    Executed { command: CommandId, result: ApplyResult },
}

impl HistoryOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(
            self,
            Self::Executed {
                result: ApplyResult::Committed,
                ..
            }
        )
    }
}
