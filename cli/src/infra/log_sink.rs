//! `LogSink` adapter that forwards workload output to `tracing`.

use deckhand_common::{StreamKind, WorkloadId};

use crate::application::ports::LogSink;

/// Emits every message as a `tracing` event tagged with the workload.
///
/// | kind       | level |
/// |------------|-------|
/// | `Progress` | info  |
/// | `Stdout`   | info  |
/// | `Stderr`   | warn  |
/// | `Error`    | error |
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn write(&self, id: &WorkloadId, message: &str, kind: StreamKind) {
        match kind {
            StreamKind::Progress => tracing::info!(workload = %id, stream = "progress", "{message}"),
            StreamKind::Stdout => tracing::info!(workload = %id, stream = "stdout", "{message}"),
            StreamKind::Stderr => tracing::warn!(workload = %id, stream = "stderr", "{message}"),
            StreamKind::Error => tracing::error!(workload = %id, stream = "error", "{message}"),
        }
    }
}
