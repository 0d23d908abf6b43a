//! Error types for every layer of the engine.
//! Each enum maps to a stable string code through [`ErrorCode`].

pub mod config_error;
pub mod engine_error;
pub mod error_code;
pub mod schema_error;
pub mod storage_error;

pub use config_error::ConfigError;
pub use engine_error::{EngineError, EngineResult};
pub use error_code::ErrorCode;
pub use schema_error::SchemaReadError;
pub use storage_error::StorageError;
