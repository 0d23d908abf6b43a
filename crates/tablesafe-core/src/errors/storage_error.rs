//! Storage-layer errors for SQLite operations.

use super::error_code::{self, ErrorCode};
use crate::types::value::NonUtf8Text;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    SqliteError { message: String },

    #[error("Database locked by another session: {path} ({message})")]
    Locked { path: String, message: String },

    #[error("Database corrupt: {details}")]
    DbCorrupt { details: String },

    #[error("Operation not supported: {operation}: {reason}")]
    NotSupported { operation: String, reason: String },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Stored value cannot be read exactly: {0}")]
    NonUtf8Text(NonUtf8Text),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::FromSqlConversionFailure(_, _, source) = &e {
            if let Some(text) = source.downcast_ref::<NonUtf8Text>() {
                return Self::NonUtf8Text(text.clone());
            }
        }
        Self::SqliteError {
            message: e.to_string(),
        }
    }
}

impl ErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Locked { .. } => error_code::SESSION_LOCKED,
            Self::NotSupported { .. } => error_code::NOT_SUPPORTED,
            Self::Cancelled { .. } => error_code::CANCELLED,
            Self::Io(_) => error_code::IO_ERROR,
            _ => error_code::STORAGE_ERROR,
        }
    }
}
