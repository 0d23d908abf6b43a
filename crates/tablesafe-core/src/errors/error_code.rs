//! Stable error codes surfaced to UI collaborators.

pub const VALIDATION_BLOCKED: &str = "VALIDATION_BLOCKED";
pub const PRECONDITION_FAILED: &str = "PRECONDITION_FAILED";
pub const SCHEMA_READ_ERROR: &str = "SCHEMA_READ_ERROR";
pub const TRANSACTION_ERROR: &str = "TRANSACTION_ERROR";
pub const CONSTRUCTION_ERROR: &str = "CONSTRUCTION_ERROR";
pub const SESSION_BUSY: &str = "SESSION_BUSY";
pub const SESSION_LOCKED: &str = "SESSION_LOCKED";
pub const CANCELLED: &str = "CANCELLED";
pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
pub const NOT_SUPPORTED: &str = "NOT_SUPPORTED";
pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
pub const IO_ERROR: &str = "IO_ERROR";

/// Maps an error to a stable, machine-readable code.
pub trait ErrorCode {
    fn error_code(&self) -> &'static str;
}
