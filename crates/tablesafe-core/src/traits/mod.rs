//! Shared traits used across tablesafe crates.

pub mod cancellation;
pub mod progress;

pub use cancellation::CancellationToken;
pub use progress::{Progress, ProgressObserver, WorkControl};
