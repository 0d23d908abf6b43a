//! Schema inspection errors. Always surfaced, never defaulted.

use super::error_code::{self, ErrorCode};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SchemaReadError {
    #[error("Schema query failed: {message}")]
    Query { message: String },

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Catalog entry for {table} is inconsistent: {details}")]
    Inconsistent { table: String, details: String },
}

impl From<rusqlite::Error> for SchemaReadError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Query {
            message: e.to_string(),
        }
    }
}

impl ErrorCode for SchemaReadError {
    fn error_code(&self) -> &'static str {
        error_code::SCHEMA_READ_ERROR
    }
}
