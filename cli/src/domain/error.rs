//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, or `tokio`. Collaborator failures arrive as
//! `anyhow::Error` and are flattened into [`LifecycleError::RemoteFailure`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use deckhand_common::RunState;
use thiserror::Error;

/// Failure of a lifecycle operation on one workload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("Operation canceled: superseded by a newer operation or shut down.")]
    Canceled,

    #[error("Workload '{name}' no longer exists on the control plane.")]
    Vanished { name: String },

    #[error(
        "Timed out after {}s waiting for the workload to run (last state: {last_state}).",
        .elapsed.as_secs()
    )]
    TimedOut {
        last_state: RunState,
        elapsed: Duration,
        /// True when polling stopped on `flapping`/`crashed` before the budget ran out.
        settled: bool,
    },

    #[error("Control plane call failed: {0}")]
    RemoteFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LifecycleError {
    /// Wrap a collaborator failure, keeping its whole context chain.
    #[must_use]
    pub fn remote(error: &anyhow::Error) -> Self {
        Self::RemoteFailure(format!("{error:#}"))
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Canceled => FailureKind::Canceled,
            Self::Vanished { .. } => FailureKind::Vanished,
            Self::TimedOut { .. } => FailureKind::TimedOut,
            Self::RemoteFailure(_) => FailureKind::RemoteFailure,
            Self::Internal(_) => FailureKind::Internal,
        }
    }
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration key/value validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown setting: {key}\n\nValid settings: {valid}")]
    UnknownKey { key: String, valid: String },

    #[error("Invalid value for {key}: {value}\n\n{reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Payload-free discriminant of [`LifecycleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Canceled,
    Vanished,
    TimedOut,
    RemoteFailure,
    Internal,
}

/// Last failure recorded for a workload, as shown next to its run state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailure {
    pub kind: FailureKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl From<&LifecycleError> for OperationFailure {
    fn from(error: &LifecycleError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            at: Utc::now(),
        }
    }
}
