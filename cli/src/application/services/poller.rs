//! Application service: wait for a workload to settle after an activating
//! operation.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use deckhand_common::{RunState, StreamKind, WorkloadId, WorkloadSnapshot};
use tokio::time::Instant;

use crate::application::ports::LogSink;
use crate::domain::cancel::CancelToken;
use crate::domain::error::LifecycleError;

/// Fetch-merge-sleep loop with a fixed interval.
pub struct StatePoller {
    interval: Duration,
    log: Arc<dyn LogSink>,
}

impl StatePoller {
    #[must_use]
    pub fn new(interval: Duration, log: Arc<dyn LogSink>) -> Self {
        Self { interval, log }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll `fetch` until the workload settles or `timeout` elapses.
    ///
    /// Settled means `Running`, `Flapping` or `Crashed`. Only `Running` is a
    /// success; any other outcome is reported as `TimedOut`, with
    /// `settled = true` when the loop stopped on a bad settled state rather
    /// than on the deadline. One progress line goes to the log sink per
    /// iteration.
    ///
    /// # Errors
    ///
    /// - `Vanished` if `fetch` reports the workload gone.
    /// - `Canceled` if `token` is canceled at the top of an iteration.
    /// - `TimedOut` as described above.
    /// - Whatever `fetch` itself fails with.
    pub async fn await_running<F, Fut>(
        &self,
        id: &WorkloadId,
        token: &CancelToken,
        mut fetch: F,
        timeout: Duration,
    ) -> Result<RunState, LifecycleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<WorkloadSnapshot>, LifecycleError>>,
    {
        let started = Instant::now();
        let mut snapshot = fetch().await?.ok_or_else(|| vanished(id))?;

        let state = loop {
            let state = snapshot.run_state();
            if token.is_canceled() {
                tracing::debug!(workload = %id, token = token.seq(), "poll abandoned");
                return Err(LifecycleError::Canceled);
            }
            if state.is_settled() {
                break state;
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                break state;
            }
            let remaining = timeout - elapsed;
            self.log.write(
                id,
                &format!(
                    "Waiting for {} to start, {}s left (currently {state})",
                    id.name,
                    remaining.as_secs_f64().ceil()
                ),
                StreamKind::Progress,
            );
            tokio::time::sleep(self.interval.min(remaining)).await;
            snapshot = fetch().await?.ok_or_else(|| vanished(id))?;
        };

        let elapsed = started.elapsed();
        tracing::debug!(workload = %id, state = ?state, elapsed_ms = elapsed.as_millis(), "poll finished");
        if state == RunState::Running {
            return Ok(state);
        }
        Err(LifecycleError::TimedOut {
            last_state: state,
            elapsed,
            settled: state.is_settled(),
        })
    }
}

fn vanished(id: &WorkloadId) -> LifecycleError {
    LifecycleError::Vanished {
        name: id.name.clone(),
    }
}
