//! # tablesafe-core
//!
//! Foundation crate for the tablesafe mutation engine.
//! Defines all types, traits, errors, config, and tracing setup.
//! `tablesafe-storage` depends on this for every shared definition.

pub mod config;
pub mod errors;
pub mod sql;
pub mod tracing;
pub mod traits;
pub mod types;

// Re-export the most commonly used types at the crate root.
pub use config::TableSafeConfig;
pub use errors::error_code::ErrorCode;
pub use traits::{CancellationToken, Progress, ProgressObserver, WorkControl};
pub use types::command::{
    Action, Command, CommandId, Direction, MutationPlan, Precondition, Statement,
};
pub use types::identity::{RowIdentity, RowSelector};
pub use types::log::{LogEntry, LogOrigin, LogOutcome};
pub use types::mutation::{ColumnDef, MutationKind, MutationRequest};
pub use types::outcome::{
    ApplyResult, BlockReason, HistoryOutcome, MutationOutcome, RollbackReason, ValidationResult,
};
pub use types::schema::{
    ColumnSchema, ForeignKey, IndexSchema, SchemaSnapshot, TableDefinition, TableKind, TableSchema,
    TriggerSchema,
};
pub use types::value::{Affinity, CellValue, InputError, NonUtf8Text};
