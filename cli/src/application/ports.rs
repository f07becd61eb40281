//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and `deckhand_common`, never
//! from `crate::infra`, `crate::commands`, or `crate::output`.
//!
//! Ports are object-safe `async_trait`s: controllers hold them as
//! `Arc<dyn …>` and run operations on spawned tasks, so every future must be
//! `Send`.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use deckhand_common::{ArtifactRef, StreamKind, WorkloadId, WorkloadSnapshot};

use crate::domain::cancel::CancelToken;
use crate::domain::config::DeckhandConfig;

// ── Control Plane Port ────────────────────────────────────────────────────────

/// Remote control-plane client.
///
/// Every call may fail with a transport or auth error; the core treats such
/// failures as opaque.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Current status of `name`, or `None` when the platform no longer knows it.
    async fn fetch_snapshot(&self, name: &str) -> Result<Option<WorkloadSnapshot>>;
    /// Ask the platform to stop every replica of `name`.
    async fn issue_stop(&self, name: &str) -> Result<()>;
    /// Restart `name`. The token lets long uploads bail out early.
    async fn issue_restart(&self, name: &str, token: &CancelToken) -> Result<()>;
    /// Push `artifact` and roll `name` onto it.
    async fn issue_redeploy(
        &self,
        name: &str,
        artifact: &ArtifactRef,
        token: &CancelToken,
    ) -> Result<()>;
    /// Restart `name` with its debug agent enabled on `port`.
    async fn issue_debug_restart(&self, name: &str, port: u16, token: &CancelToken)
    -> Result<()>;
    /// Remove `name` from the platform.
    async fn issue_delete(&self, name: &str) -> Result<()>;
}

// ── Debugger Port ─────────────────────────────────────────────────────────────

/// Tracks which workloads currently have a debugger session attached.
#[async_trait]
pub trait DebuggerProbe: Send + Sync {
    /// Whether a debugger is attached to `id` right now.
    fn is_attached(&self, id: &WorkloadId) -> bool;
    /// Open a debugger session against `id` on `port`.
    async fn attach(&self, id: &WorkloadId, port: u16) -> Result<()>;
}

/// Probe for deployments without debugger support.
pub struct NoDebugger;

#[async_trait]
impl DebuggerProbe for NoDebugger {
    fn is_attached(&self, _: &WorkloadId) -> bool {
        false
    }

    async fn attach(&self, id: &WorkloadId, _: u16) -> Result<()> {
        anyhow::bail!("no debugger available for {id}")
    }
}

// ── Log Sink Port ─────────────────────────────────────────────────────────────

/// Progress and diagnostic output, fire-and-forget. Sync trait; implementations
/// must swallow their own failures.
pub trait LogSink: Send + Sync {
    fn write(&self, id: &WorkloadId, message: &str, kind: StreamKind);
}

// ── Config Store Port ─────────────────────────────────────────────────────────

/// Persistence for `DeckhandConfig`.
pub trait ConfigStore {
    /// Load the configuration, or defaults if none has been saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn load(&self) -> Result<DeckhandConfig>;

    /// Persist `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn save(&self, config: &DeckhandConfig) -> Result<()>;

    /// Location of the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    fn path(&self) -> Result<PathBuf>;
}
