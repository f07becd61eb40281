//! Application service: per-workload lifecycle controller.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! All remote I/O is routed through the injected [`ControllerDeps`].

use std::sync::Arc;

use deckhand_common::{
    ArtifactRef, DesiredState, LifecycleConfig, RunState, StreamKind, WorkloadId,
    WorkloadSnapshot,
};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ControlPlane, DebuggerProbe, LogSink};
use crate::application::services::poller::StatePoller;
use crate::application::services::tracker::OperationTracker;
use crate::domain::cancel::{CancelToken, CancellationRegistry};
use crate::domain::cell::{Derived, ListenerId, Var, batch};
use crate::domain::error::{LifecycleError, OperationFailure};

/// Collaborators shared by every controller of one session.
#[derive(Clone)]
pub struct ControllerDeps {
    pub plane: Arc<dyn ControlPlane>,
    pub debugger: Arc<dyn DebuggerProbe>,
    pub log: Arc<dyn LogSink>,
    pub config: LifecycleConfig,
}

/// Owns the authoritative run state of one workload and the operations
/// that change it.
///
/// `stop`, `restart`, `redeploy` and `attach_debug` supersede each other:
/// each new call cancels the tokens of older ones. `delete` stands apart and
/// never cancels or gets canceled by the others.
pub struct WorkloadController {
    id: WorkloadId,
    deps: ControllerDeps,
    cancel: CancellationRegistry,
    tracker: OperationTracker,
    snapshot: Var<Option<WorkloadSnapshot>>,
    debugger_attached: Var<bool>,
    base_state: Derived<RunState>,
    state: Derived<RunState>,
    snapshot_lock: tokio::sync::Mutex<()>,
    poller: StatePoller,
}

impl WorkloadController {
    /// Build a controller whose tokens also cancel when `ambient` fires.
    #[must_use]
    pub fn new(id: WorkloadId, deps: ControllerDeps, ambient: CancellationToken) -> Self {
        let tracker = OperationTracker::new();
        let snapshot: Var<Option<WorkloadSnapshot>> = Var::new(None);
        let debugger_attached = Var::new(false);

        let base_state = {
            let last_error = tracker.last_error_cell().clone();
            let in_progress = tracker.in_progress_cell().clone();
            let snapshot = snapshot.clone();
            Derived::new(
                vec![last_error.source(), in_progress.source(), snapshot.source()],
                move || {
                    if last_error.get().is_some() {
                        RunState::Unknown
                    } else if in_progress.get() > 0 {
                        RunState::Starting
                    } else {
                        snapshot
                            .get()
                            .as_ref()
                            .map_or(RunState::Unknown, WorkloadSnapshot::run_state)
                    }
                },
            )
        };

        let state = {
            let base = base_state.clone();
            let attached = debugger_attached.clone();
            Derived::new(vec![base_state.source(), debugger_attached.source()], move || {
                match base.get() {
                    RunState::Running if attached.get() => RunState::Debugging,
                    other => other,
                }
            })
        };

        let poller = StatePoller::new(deps.config.poll_interval(), Arc::clone(&deps.log));
        Self {
            id,
            cancel: CancellationRegistry::new(ambient),
            deps,
            tracker,
            snapshot,
            debugger_attached,
            base_state,
            state,
            snapshot_lock: tokio::sync::Mutex::new(()),
            poller,
        }
    }

    #[must_use]
    pub fn id(&self) -> &WorkloadId {
        &self.id
    }

    /// Current authoritative run state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state.get()
    }

    /// Run `listener` after every change of [`Self::state`].
    pub fn on_state_change(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.state.on_change(listener)
    }

    pub fn remove_state_listener(&self, id: ListenerId) {
        self.state.remove_listener(id);
    }

    #[must_use]
    pub fn last_failure(&self) -> Option<OperationFailure> {
        self.tracker.last_error()
    }

    #[must_use]
    pub fn in_progress(&self) -> u32 {
        self.tracker.in_progress()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<WorkloadSnapshot> {
        self.snapshot.get()
    }

    #[must_use]
    pub fn is_debugger_attached(&self) -> bool {
        self.debugger_attached.get()
    }

    /// Number of operation tokens that have not been canceled yet.
    #[must_use]
    pub fn outstanding_operations(&self) -> usize {
        self.cancel.outstanding()
    }

    // ── Operations ─────────────────────────────────────────────────────────

    /// Stop every replica, superseding any in-flight activation.
    ///
    /// Returns the merged state of the snapshot fetched after the stop. The
    /// published [`state`](Self::state) can still read `Starting` for a moment,
    /// until a superseded activation has released its in-progress count.
    ///
    /// # Errors
    ///
    /// `Canceled` if the controller was disposed or a newer operation took
    /// over before the remote call; otherwise any remote or refresh failure.
    pub async fn stop(&self) -> Result<RunState, LifecycleError> {
        let token = self.cancel.create();
        let result = async {
            self.cancel.cancel_all_before(&token)?;
            token.check()?;
            self.progress(&format!("Stopping {}", self.id.name));
            self.deps
                .plane
                .issue_stop(&self.id.name)
                .await
                .map_err(|e| LifecycleError::remote(&e))?;
            self.refresh_with(&token).await
        }
        .await;
        self.record_untracked(&token, &result);
        self.finish("stop", &token, result)
    }

    /// Restart the workload; with `target == Started`, wait for it to run.
    ///
    /// # Errors
    ///
    /// `Canceled` when superseded, `TimedOut` or `Vanished` from polling,
    /// `RemoteFailure` from the control plane.
    pub async fn restart(&self, target: DesiredState) -> Result<RunState, LifecycleError> {
        let token = self.cancel.create();
        let result = self
            .tracker
            .while_executing(&token, async {
                self.supersede_older(&token)?;
                self.progress(&format!("Restarting {}", self.id.name));
                self.deps
                    .plane
                    .issue_restart(&self.id.name, &token)
                    .await
                    .map_err(|e| LifecycleError::remote(&e))?;
                self.settle(&token, target).await
            })
            .await;
        self.finish("restart", &token, result.map(|()| self.state()))
    }

    /// Push `artifact` and roll the workload onto it.
    ///
    /// # Errors
    ///
    /// Same as [`Self::restart`].
    pub async fn redeploy(
        &self,
        artifact: &ArtifactRef,
        target: DesiredState,
    ) -> Result<RunState, LifecycleError> {
        let token = self.cancel.create();
        let result = self
            .tracker
            .while_executing(&token, async {
                self.supersede_older(&token)?;
                self.progress(&format!(
                    "Redeploying {} from {}",
                    self.id.name, artifact.location
                ));
                self.deps
                    .plane
                    .issue_redeploy(&self.id.name, artifact, &token)
                    .await
                    .map_err(|e| LifecycleError::remote(&e))?;
                self.settle(&token, target).await
            })
            .await;
        self.finish("redeploy", &token, result.map(|()| self.state()))
    }

    /// Restart in debug mode, wait for it to run, then attach a debugger.
    ///
    /// # Errors
    ///
    /// Same as [`Self::restart`], plus `RemoteFailure` if attaching fails.
    pub async fn attach_debug(&self, port: u16) -> Result<RunState, LifecycleError> {
        let token = self.cancel.create();
        let result = self
            .tracker
            .while_executing(&token, async {
                self.supersede_older(&token)?;
                self.progress(&format!(
                    "Restarting {} with debugging on port {port}",
                    self.id.name
                ));
                self.deps
                    .plane
                    .issue_debug_restart(&self.id.name, port, &token)
                    .await
                    .map_err(|e| LifecycleError::remote(&e))?;
                self.await_running(&token).await?;
                token.check()?;
                self.deps
                    .debugger
                    .attach(&self.id, port)
                    .await
                    .map_err(|e| LifecycleError::remote(&e))?;
                self.refresh_with(&token).await.map(drop)
            })
            .await;
        self.finish("attach-debug", &token, result.map(|()| self.state()))
    }

    /// Remove the workload from the control plane.
    ///
    /// Runs alongside any other operation: it takes no operation token, so it
    /// neither supersedes nor can be superseded. Only controller disposal
    /// stops it before the remote call.
    ///
    /// # Errors
    ///
    /// `Canceled` after disposal, otherwise `RemoteFailure`.
    pub async fn delete(&self) -> Result<(), LifecycleError> {
        if self.cancel.ambient().is_cancelled() {
            return Err(LifecycleError::Canceled);
        }
        self.progress(&format!("Deleting {}", self.id.name));
        let result = self
            .deps
            .plane
            .issue_delete(&self.id.name)
            .await
            .map_err(|e| LifecycleError::remote(&e));
        if let Err(error) = &result {
            self.report("delete", error);
        }
        result
    }

    /// Fetch the workload once and publish the result.
    ///
    /// Runs alongside operations without superseding them.
    ///
    /// # Errors
    ///
    /// `Vanished` if the control plane no longer knows the workload,
    /// `RemoteFailure` if the fetch fails.
    pub async fn refresh(&self) -> Result<RunState, LifecycleError> {
        let token = self.cancel.create();
        let result = self.refresh_with(&token).await;
        self.record_untracked(&token, &result);
        self.finish("refresh", &token, result.map(|_| self.state()))
    }

    /// Publish a snapshot obtained elsewhere, e.g. from a bulk listing.
    ///
    /// Ignored once the controller has been disposed.
    pub async fn apply_snapshot(&self, snapshot: WorkloadSnapshot) -> RunState {
        if !self.cancel.ambient().is_cancelled() {
            let _guard = self.snapshot_lock.lock().await;
            self.publish(snapshot);
        }
        self.state()
    }

    /// Cancel every operation and detach the derived state from its inputs.
    pub fn dispose(&self) {
        self.cancel.ambient().cancel();
        self.cancel.cancel_all();
        self.state.dispose();
        self.base_state.dispose();
        tracing::debug!(workload = %self.id, "controller disposed");
    }

    // ── Internals ──────────────────────────────────────────────────────────

    /// Cancel older operations. Must run after the calling operation has
    /// been counted as in progress, so the run state never dips out of
    /// `Starting` between the two.
    fn supersede_older(&self, token: &CancelToken) -> Result<(), LifecycleError> {
        let canceled = self.cancel.cancel_all_before(token)?;
        if canceled > 0 {
            tracing::debug!(workload = %self.id, token = token.seq(), canceled, "superseded older operations");
        }
        token.check()
    }

    async fn settle(&self, token: &CancelToken, target: DesiredState) -> Result<(), LifecycleError> {
        if target == DesiredState::Started {
            self.await_running(token).await?;
        }
        token.check()?;
        self.refresh_with(token).await.map(drop)
    }

    async fn await_running(&self, token: &CancelToken) -> Result<RunState, LifecycleError> {
        self.poller
            .await_running(
                &self.id,
                token,
                || self.poll_fetch(token),
                self.deps.config.start_timeout(),
            )
            .await
    }

    async fn fetch(&self) -> Result<Option<WorkloadSnapshot>, LifecycleError> {
        self.deps
            .plane
            .fetch_snapshot(&self.id.name)
            .await
            .map_err(|e| LifecycleError::remote(&e))
    }

    /// Fetch used by the poller: every snapshot it sees is published too.
    async fn poll_fetch(
        &self,
        token: &CancelToken,
    ) -> Result<Option<WorkloadSnapshot>, LifecycleError> {
        let Some(snapshot) = self.fetch().await? else {
            return Ok(None);
        };
        self.store(token, snapshot.clone()).await?;
        Ok(Some(snapshot))
    }

    /// Fetch and publish; returns the snapshot's own merged state.
    async fn refresh_with(&self, token: &CancelToken) -> Result<RunState, LifecycleError> {
        token.check()?;
        let snapshot = self.fetch().await?.ok_or_else(|| LifecycleError::Vanished {
            name: self.id.name.clone(),
        })?;
        let state = snapshot.run_state();
        self.store(token, snapshot).await?;
        Ok(state)
    }

    /// Publish `snapshot` unless `token` has been canceled. The check and the
    /// write happen under the snapshot lock, so a superseded operation can
    /// never write after its cancellation is visible.
    async fn store(&self, token: &CancelToken, snapshot: WorkloadSnapshot) -> Result<(), LifecycleError> {
        let _guard = self.snapshot_lock.lock().await;
        token.check()?;
        self.publish(snapshot);
        Ok(())
    }

    fn publish(&self, snapshot: WorkloadSnapshot) {
        let attached = self.deps.debugger.is_attached(&self.id);
        batch(|| {
            self.snapshot.set(Some(snapshot));
            self.debugger_attached.set(attached);
            self.tracker.clear_error();
        });
        tracing::trace!(workload = %self.id, state = ?self.state(), "snapshot published");
    }

    /// Record failures of operations that do not run under the tracker.
    fn record_untracked<T>(&self, token: &CancelToken, result: &Result<T, LifecycleError>) {
        match result {
            Err(error) if !error.is_canceled() && !token.is_canceled() => {
                self.tracker.record(error);
            }
            _ => {}
        }
    }

    fn finish<T>(
        &self,
        op: &str,
        token: &CancelToken,
        result: Result<T, LifecycleError>,
    ) -> Result<T, LifecycleError> {
        match &result {
            Err(error) if error.is_canceled() => {
                tracing::debug!(workload = %self.id, token = token.seq(), op, "operation canceled");
            }
            Err(error) => self.report(op, error),
            Ok(_) => {
                tracing::debug!(workload = %self.id, token = token.seq(), op, "operation finished");
            }
        }
        result
    }

    fn report(&self, op: &str, error: &LifecycleError) {
        tracing::warn!(workload = %self.id, op, kind = ?error.kind(), "{error}");
        self.deps
            .log
            .write(&self.id, &format!("{op} failed: {error}"), StreamKind::Error);
    }

    fn progress(&self, message: &str) {
        self.deps.log.write(&self.id, message, StreamKind::Progress);
    }
}

impl Drop for WorkloadController {
    fn drop(&mut self) {
        self.cancel.cancel_all();
    }
}
