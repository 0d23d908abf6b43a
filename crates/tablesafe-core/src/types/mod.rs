//! Domain types shared by the validator, executor, history and log.

pub mod command;
pub mod identity;
pub mod log;
pub mod mutation;
pub mod outcome;
pub mod schema;
pub mod value;
