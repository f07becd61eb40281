//! In-memory control plane for dry runs and tests.
//!
//! Every workload starts as `Started` with all replicas `Running`. After an
//! activating call (restart, redeploy, debug restart) its replicas report
//! `Starting` for `settle_after` fetches, then the configured outcome: the
//! first replica takes the outcome, the others run normally.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use deckhand_common::{
    ArtifactRef, DesiredState, ReplicaStatus, WorkloadId, WorkloadSnapshot,
};

use crate::application::ports::{ControlPlane, DebuggerProbe};
use crate::domain::cancel::CancelToken;

/// How simulated workloads behave after an activating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationPlan {
    pub replicas: u32,
    /// Fetches that still report `Starting` after an activating call.
    pub settle_after: u32,
    pub outcome: ReplicaStatus,
    /// Delay applied to every remote call.
    pub latency: Duration,
}

impl Default for SimulationPlan {
    fn default() -> Self {
        Self {
            replicas: 1,
            settle_after: 2,
            outcome: ReplicaStatus::Running,
            latency: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
struct SimWorkload {
    desired: DesiredState,
    pending_polls: u32,
    debug_port: Option<u16>,
    artifact: Option<String>,
}

impl SimWorkload {
    fn running() -> Self {
        Self {
            desired: DesiredState::Started,
            pending_polls: 0,
            debug_port: None,
            artifact: None,
        }
    }
}

/// `ControlPlane` and `DebuggerProbe` backed by a map in memory.
pub struct SimulatedControlPlane {
    plan: SimulationPlan,
    workloads: Mutex<HashMap<String, SimWorkload>>,
    attached: Mutex<HashSet<WorkloadId>>,
}

impl SimulatedControlPlane {
    #[must_use]
    pub fn new(plan: SimulationPlan) -> Self {
        Self {
            plan,
            workloads: Mutex::new(HashMap::new()),
            attached: Mutex::new(HashSet::new()),
        }
    }

    /// Register `name` as a running workload.
    #[must_use]
    pub fn with_workload(self, name: &str) -> Self {
        self.lock().insert(name.to_string(), SimWorkload::running());
        self
    }

    /// Names currently known to the plane, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Artifact the workload was last redeployed from.
    #[must_use]
    pub fn artifact(&self, name: &str) -> Option<String> {
        self.lock().get(name).and_then(|w| w.artifact.clone())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SimWorkload>> {
        self.workloads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_attached(&self) -> MutexGuard<'_, HashSet<WorkloadId>> {
        self.attached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn latency(&self) {
        if !self.plan.latency.is_zero() {
            tokio::time::sleep(self.plan.latency).await;
        }
    }

    fn activate(&self, name: &str, debug_port: Option<u16>, artifact: Option<&ArtifactRef>) -> Result<()> {
        let mut workloads = self.lock();
        let Some(workload) = workloads.get_mut(name) else {
            bail!("workload '{name}' not found");
        };
        workload.desired = DesiredState::Started;
        workload.pending_polls = self.plan.settle_after;
        workload.debug_port = debug_port;
        if let Some(artifact) = artifact {
            workload.artifact = Some(artifact.location.clone());
        }
        drop(workloads);
        if debug_port.is_none() {
            self.lock_attached().retain(|id| id.name != name);
        }
        Ok(())
    }

    fn replicas(&self, workload: &SimWorkload) -> Vec<ReplicaStatus> {
        if workload.desired == DesiredState::Stopped {
            return Vec::new();
        }
        (0..self.plan.replicas)
            .map(|i| {
                if workload.pending_polls > 0 {
                    ReplicaStatus::Starting
                } else if i == 0 && workload.debug_port.is_none() {
                    // Debug restarts always come up.
                    self.plan.outcome
                } else {
                    ReplicaStatus::Running
                }
            })
            .collect()
    }
}

#[async_trait]
impl ControlPlane for SimulatedControlPlane {
    async fn fetch_snapshot(&self, name: &str) -> Result<Option<WorkloadSnapshot>> {
        self.latency().await;
        let mut workloads = self.lock();
        let Some(workload) = workloads.get_mut(name) else {
            return Ok(None);
        };
        let replicas = self.replicas(workload);
        workload.pending_polls = workload.pending_polls.saturating_sub(1);
        Ok(Some(WorkloadSnapshot::new(
            name,
            workload.desired,
            self.plan.replicas,
            replicas,
        )))
    }

    async fn issue_stop(&self, name: &str) -> Result<()> {
        self.latency().await;
        let mut workloads = self.lock();
        let Some(workload) = workloads.get_mut(name) else {
            bail!("workload '{name}' not found");
        };
        workload.desired = DesiredState::Stopped;
        workload.pending_polls = 0;
        workload.debug_port = None;
        drop(workloads);
        self.lock_attached().retain(|id| id.name != name);
        Ok(())
    }

    async fn issue_restart(&self, name: &str, token: &CancelToken) -> Result<()> {
        self.latency().await;
        token.check()?;
        self.activate(name, None, None)
    }

    async fn issue_redeploy(
        &self,
        name: &str,
        artifact: &ArtifactRef,
        token: &CancelToken,
    ) -> Result<()> {
        self.latency().await;
        token.check()?;
        self.activate(name, None, Some(artifact))
    }

    async fn issue_debug_restart(&self, name: &str, port: u16, token: &CancelToken) -> Result<()> {
        self.latency().await;
        token.check()?;
        self.activate(name, Some(port), None)
    }

    async fn issue_delete(&self, name: &str) -> Result<()> {
        self.latency().await;
        if self.lock().remove(name).is_none() {
            bail!("workload '{name}' not found");
        }
        self.lock_attached().retain(|id| id.name != name);
        Ok(())
    }
}

#[async_trait]
impl DebuggerProbe for SimulatedControlPlane {
    fn is_attached(&self, id: &WorkloadId) -> bool {
        self.lock_attached().contains(id)
    }

    async fn attach(&self, id: &WorkloadId, port: u16) -> Result<()> {
        let debug_port = self.lock().get(&id.name).and_then(|w| w.debug_port);
        match debug_port {
            Some(p) if p == port => {
                self.lock_attached().insert(id.clone());
                Ok(())
            }
            Some(p) => bail!("{id} listens for a debugger on port {p}, not {port}"),
            None => bail!("{id} is not running in debug mode"),
        }
    }
}
