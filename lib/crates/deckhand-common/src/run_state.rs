//! Workload run states and the merge algebra that folds replica states into
//! one aggregate state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::DesiredState;

/// Aggregate lifecycle classification of a workload.
///
/// `Debugging` is never reported by a replica. It only appears once a
/// controller has upgraded `Running` because a debugger is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Unknown,
    Inactive,
    Starting,
    Running,
    Flapping,
    Crashed,
    Debugging,
}

impl RunState {
    pub const ALL: [RunState; 7] = [
        RunState::Unknown,
        RunState::Inactive,
        RunState::Starting,
        RunState::Running,
        RunState::Flapping,
        RunState::Crashed,
        RunState::Debugging,
    ];

    /// Position in the merge order. Higher wins.
    ///
    /// `Unknown < Inactive < Debugging < Running < Starting < Flapping < Crashed`
    const fn severity(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Inactive => 1,
            Self::Debugging => 2,
            Self::Running => 3,
            Self::Starting => 4,
            Self::Flapping => 5,
            Self::Crashed => 6,
        }
    }

    /// Combine two states, keeping the more pessimistic one.
    ///
    /// Commutative and associative, with `Unknown` as identity.
    #[must_use]
    pub const fn merge(self, other: RunState) -> RunState {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Fold a sequence of states left to right, starting from `Unknown`.
    #[must_use]
    pub fn merge_all(states: impl IntoIterator<Item = RunState>) -> RunState {
        states.into_iter().fold(RunState::Unknown, RunState::merge)
    }

    /// Aggregate the replicas of one workload.
    ///
    /// With no replicas the desired state decides: a workload that should be
    /// stopped is `Inactive`, anything else is `Unknown`.
    #[must_use]
    pub fn from_replicas(desired: DesiredState, replicas: &[ReplicaStatus]) -> RunState {
        if replicas.is_empty() {
            return match desired {
                DesiredState::Stopped => RunState::Inactive,
                DesiredState::Started => RunState::Unknown,
            };
        }
        Self::merge_all(replicas.iter().copied().map(RunState::from))
    }

    /// States at which the poller stops waiting.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Running | Self::Flapping | Self::Crashed)
    }

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Inactive => "inactive",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Flapping => "flapping",
            Self::Crashed => "crashed",
            Self::Debugging => "debugging",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunState {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// Instantaneous state of one observed replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaStatus {
    Running,
    Crashed,
    Flapping,
    Starting,
    Down,
    Unknown,
}

impl ReplicaStatus {
    pub const ALL: [ReplicaStatus; 6] = [
        ReplicaStatus::Running,
        ReplicaStatus::Crashed,
        ReplicaStatus::Flapping,
        ReplicaStatus::Starting,
        ReplicaStatus::Down,
        ReplicaStatus::Unknown,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Crashed => "crashed",
            Self::Flapping => "flapping",
            Self::Starting => "starting",
            Self::Down => "down",
            Self::Unknown => "unknown",
        }
    }
}

impl From<ReplicaStatus> for RunState {
    fn from(status: ReplicaStatus) -> Self {
        match status {
            ReplicaStatus::Running => RunState::Running,
            ReplicaStatus::Crashed => RunState::Crashed,
            ReplicaStatus::Flapping => RunState::Flapping,
            ReplicaStatus::Starting => RunState::Starting,
            ReplicaStatus::Down => RunState::Inactive,
            ReplicaStatus::Unknown => RunState::Unknown,
        }
    }
}

impl fmt::Display for ReplicaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplicaStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// A status string that matches no known state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised status '{0}'")]
pub struct ParseStatusError(pub String);
