use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::run_state::{ReplicaStatus, RunState};

/// State the operator asked the platform to keep a workload in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    #[default]
    Started,
    Stopped,
}

/// Stable identity of a workload: its name on one deployment target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkloadId {
    pub name: String,
    pub target: String,
}

impl WorkloadId {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.target)
    }
}

/// Immutable status of a workload as fetched from the control plane.
///
/// A snapshot is always replaced whole; nothing mutates one in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadSnapshot {
    pub name: String,
    pub desired_state: DesiredState,
    pub desired_replicas: u32,
    pub replicas: Vec<ReplicaStatus>,
    pub fetched_at: DateTime<Utc>,
}

impl WorkloadSnapshot {
    pub fn new(
        name: impl Into<String>,
        desired_state: DesiredState,
        desired_replicas: u32,
        replicas: Vec<ReplicaStatus>,
    ) -> Self {
        Self {
            name: name.into(),
            desired_state,
            desired_replicas,
            replicas,
            fetched_at: Utc::now(),
        }
    }

    /// Merged run state of all replicas, falling back to the desired state
    /// when there are none.
    #[must_use]
    pub fn run_state(&self) -> RunState {
        RunState::from_replicas(self.desired_state, &self.replicas)
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.run_state().is_settled()
    }
}

/// Channel a log-sink message belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Progress,
    Stdout,
    Stderr,
    Error,
}

/// Reference to a build artifact pushed by a redeploy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRef {
    pub location: String,
    /// Deployment properties forwarded to the control plane verbatim.
    #[serde(default)]
    pub properties: Vec<(String, String)>,
}

impl ArtifactRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            properties: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }
}
