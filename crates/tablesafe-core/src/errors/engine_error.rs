//! Top-level error type returned by the engine facade.
//! All subsystem errors convert into this via `From` impls.

use super::error_code::{self, ErrorCode};
use super::{ConfigError, SchemaReadError, StorageError};
use crate::types::outcome::BlockReason;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Blocked: {reason}")]
    ValidationBlocked { reason: BlockReason },

    #[error("Precondition failed: {detail}")]
    PreconditionFailed { detail: String },

    #[error("Schema read error: {0}")]
    SchemaRead(#[from] SchemaReadError),

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("Command construction error: {message}")]
    Construction { message: String },

    #[error("Another mutation is in progress")]
    Busy,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl ErrorCode for EngineError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationBlocked { .. } => error_code::VALIDATION_BLOCKED,
            Self::PreconditionFailed { .. } => error_code::PRECONDITION_FAILED,
            Self::SchemaRead(_) => error_code::SCHEMA_READ_ERROR,
            Self::Transaction { .. } => error_code::TRANSACTION_ERROR,
            Self::Construction { .. } => error_code::CONSTRUCTION_ERROR,
            Self::Busy => error_code::SESSION_BUSY,
            Self::Cancelled => error_code::CANCELLED,
            Self::Storage(e) => e.error_code(),
            Self::Config(e) => e.error_code(),
        }
    }
}

/// Convenience type alias.
pub type EngineResult<T> = Result<T, EngineError>;
