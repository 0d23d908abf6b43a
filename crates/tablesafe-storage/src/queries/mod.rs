//! Read-only SQL against the live database.

pub mod rows;
pub mod schema;
