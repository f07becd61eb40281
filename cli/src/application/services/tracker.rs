//! In-flight counter and last failure of one workload.
//!
//! Both values live in [`Var`] cells so the controller's derived run state
//! recomputes the moment either changes.

use std::future::Future;

use crate::domain::cancel::CancelToken;
use crate::domain::cell::{Var, batch};
use crate::domain::error::{LifecycleError, OperationFailure};

/// Counts activating operations (start, restart, redeploy, debug) in flight.
///
/// The tracker performs no mutual exclusion of its own; overlapping calls
/// simply stack the counter.
pub struct OperationTracker {
    in_progress: Var<u32>,
    last_error: Var<Option<OperationFailure>>,
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_progress: Var::new(0),
            last_error: Var::new(None),
        }
    }

    #[must_use]
    pub fn in_progress(&self) -> u32 {
        self.in_progress.get()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<OperationFailure> {
        self.last_error.get()
    }

    #[must_use]
    pub fn in_progress_cell(&self) -> &Var<u32> {
        &self.in_progress
    }

    #[must_use]
    pub fn last_error_cell(&self) -> &Var<Option<OperationFailure>> {
        &self.last_error
    }

    /// Record a failure observed outside `while_executing` (e.g. a refresh).
    pub fn record(&self, error: &LifecycleError) {
        self.last_error.set(Some(OperationFailure::from(error)));
    }

    pub fn clear_error(&self) {
        self.last_error.set(None);
    }

    /// Run `task` with the workload marked as in progress.
    ///
    /// The counter is incremented before `task` is polled and decremented on
    /// every exit path, including the future being dropped mid-flight. A
    /// failure is written to the last-error cell in the same batch as the
    /// decrement, so observers never see the counter drop without the error.
    /// Failures of canceled operations are not recorded: a newer operation
    /// owns the workload's state by then.
    ///
    /// # Errors
    ///
    /// Returns whatever `task` returns.
    pub async fn while_executing<T, F>(&self, token: &CancelToken, task: F) -> Result<T, LifecycleError>
    where
        F: Future<Output = Result<T, LifecycleError>>,
    {
        let guard = self.enter();
        match task.await {
            Ok(value) => {
                drop(guard);
                Ok(value)
            }
            Err(error) => {
                batch(|| {
                    if !error.is_canceled() && !token.is_canceled() {
                        self.record(&error);
                    }
                    guard.release();
                });
                Err(error)
            }
        }
    }

    fn enter(&self) -> InProgressGuard<'_> {
        batch(|| {
            self.last_error.set(None);
            self.in_progress.update(|n| n + 1);
        });
        InProgressGuard {
            counter: &self.in_progress,
            released: false,
        }
    }
}

struct InProgressGuard<'a> {
    counter: &'a Var<u32>,
    released: bool,
}

impl InProgressGuard<'_> {
    fn release(mut self) {
        self.decrement();
    }

    fn decrement(&mut self) {
        if !self.released {
            self.released = true;
            self.counter.update(|n| n.saturating_sub(1));
        }
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.decrement();
    }
}
