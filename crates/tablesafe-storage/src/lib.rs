//! # tablesafe-storage
//!
//! SQLite side of the tablesafe mutation engine.
//! Schema inspection, safety validation, transactional apply,
//! undo/redo history and the action log, behind one `EditorEngine`.

pub mod action_log;
pub mod capabilities;
pub mod connection;
pub mod engine;
pub mod executor;
pub mod gate;
pub mod history;
pub mod maintenance;
pub mod plan;
pub mod queries;
pub mod validator;

pub use action_log::ActionLog;
pub use capabilities::Capabilities;
pub use connection::DatabaseManager;
pub use engine::{EditorEngine, RawSqlResult};
pub use history::HistoryManager;
pub use queries::rows::RowSet;
