//! Progress reporting for long-running operations.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::cancellation::CancellationToken;

/// A progress report emitted between batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// What is running, e.g. `"restore rows into users"`.
    pub operation: String,
    /// Units completed so far (rows or pages).
    pub done: u64,
    /// Total units, when known up front.
    pub total: Option<u64>,
}

/// Receives progress reports. Must not block for long: it runs on the
/// thread doing the work, inside the open transaction.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &Progress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&Progress) + Send + Sync,
{
    fn on_progress(&self, progress: &Progress) {
        self(progress)
    }
}

/// Cancellation token plus optional progress observer for one unit of work.
#[derive(Clone, Default)]
pub struct WorkControl {
    pub cancel: CancellationToken,
    pub observer: Option<Arc<dyn ProgressObserver>>,
}

impl WorkControl {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn report(&self, operation: &str, done: u64, total: Option<u64>) {
        if let Some(observer) = &self.observer {
            observer.on_progress(&Progress {
                operation: operation.to_string(),
                done,
                total,
            });
        }
    }
}

impl fmt::Debug for WorkControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkControl")
            .field("cancel", &self.cancel)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
