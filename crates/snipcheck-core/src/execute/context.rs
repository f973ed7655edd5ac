//! Cancellation and progress reporting for validation runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::assemble::CompilationUnit;
use crate::report::UnitOutcome;

/// Handle for cooperative cancellation of a run.
///
/// `AbortHandle` can be cloned and shared across threads and tasks; any
/// clone can trigger the abort and every other clone observes it.
///
/// # Example
///
/// ```
/// use snipcheck_core::execute::AbortHandle;
///
/// let handle = AbortHandle::new();
/// let handle_clone = handle.clone();
///
/// assert!(!handle.is_aborted());
/// handle_clone.abort();
/// assert!(handle.is_aborted());
/// ```
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self {
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if abort has been requested.
    ///
    /// Units that have not started when this turns `true` are recorded as
    /// cancelled. Checks already in flight run to completion.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Request abort of the run.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    /// Reset the abort flag before reusing the handle for another run.
    pub fn reset(&self) {
        self.aborted.store(false, Ordering::Relaxed);
    }
}

/// Callback trait for run progress reporting.
///
/// Called from the aggregating task only, in completion order.
pub trait CheckCallback: Send + Sync {
    /// Called once the corpus is assembled, before any check starts.
    fn on_run_started(&self, _documents: usize, _checked_units: usize) {}

    /// Called when a unit's outcome is final.
    fn on_unit_finished(&self, unit: &CompilationUnit, outcome: &UnitOutcome, cached: bool);
}
