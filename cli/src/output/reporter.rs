//! `TerminalReporter`: presentation-layer implementation of `LogSink`.
//!
//! Owns a copy of the stylesheet so it can be shared with controllers as
//! `Arc<dyn LogSink>` without borrowing the `OutputContext`.

use deckhand_common::{StreamKind, WorkloadId};
use owo_colors::OwoColorize as _;

use crate::application::ports::LogSink;
use crate::output::{OutputContext, Styles};

/// Terminal log sink.
///
/// - `Progress` prints `"  → {message}"` (suppressed when quiet)
/// - `Stdout` prints `"    {message}"` (suppressed when quiet)
/// - `Stderr` prints `"  ! {message}"` to stderr
/// - `Error` prints `"  ✗ {message}"` to stderr
pub struct TerminalReporter {
    styles: Styles,
    quiet: bool,
}

impl TerminalReporter {
    #[must_use]
    pub fn new(ctx: &OutputContext) -> Self {
        Self {
            styles: ctx.styles.clone(),
            quiet: ctx.quiet,
        }
    }
}

impl LogSink for TerminalReporter {
    fn write(&self, id: &WorkloadId, message: &str, kind: StreamKind) {
        tracing::trace!(workload = %id, ?kind, "{message}");
        match kind {
            StreamKind::Progress if !self.quiet => {
                println!("  {} {message}", "→".style(self.styles.progress));
            }
            StreamKind::Stdout if !self.quiet => println!("    {message}"),
            StreamKind::Progress | StreamKind::Stdout => {}
            StreamKind::Stderr => eprintln!("  {} {message}", "!".style(self.styles.warning)),
            StreamKind::Error => eprintln!("  {} {message}", "✗".style(self.styles.error)),
        }
    }
}
