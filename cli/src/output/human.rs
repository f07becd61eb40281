//! Human-readable terminal renderer.

use std::time::Duration;

use deckhand_common::{RunState, WorkloadId};
use owo_colors::OwoColorize as _;

use crate::domain::config::DeckhandConfig;
use crate::infra::config::CONFIG_ENV;
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the effective configuration and where it came from.
    pub fn render_config(&self, config: &DeckhandConfig, path: &std::path::Path) {
        if self.ctx.quiet {
            return;
        }
        println!();
        println!(
            "  {}",
            format!("Configuration ({})", path.display()).style(self.ctx.styles.header)
        );
        println!();
        let lifecycle = &config.lifecycle;
        println!("  {:<30} {}", "lifecycle.poll_interval_ms:", lifecycle.poll_interval_ms);
        println!("  {:<30} {}", "lifecycle.start_timeout_secs:", lifecycle.start_timeout_secs);
        println!("  {:<30} {}", "lifecycle.target:", lifecycle.target);
        println!();
        println!("  {}", "Environment:".style(self.ctx.styles.bold));
        println!(
            "    {:<18} {}",
            format!("{CONFIG_ENV}:"),
            std::env::var(CONFIG_ENV).unwrap_or_else(|_| "(not set)".to_string())
        );
        println!(
            "    {:<18} {}",
            "NO_COLOR:",
            std::env::var("NO_COLOR").unwrap_or_else(|_| "(not set)".to_string())
        );
        println!();
    }

    /// Render one observed run-state change.
    pub fn render_transition(&self, id: &WorkloadId, state: RunState, elapsed: Duration) {
        if self.ctx.quiet {
            return;
        }
        println!(
            "  {} {:<8} {} {}",
            "→".style(self.ctx.styles.progress),
            format_elapsed(elapsed).style(self.ctx.styles.dim),
            id,
            state.style(self.ctx.styles.run_state(state)),
        );
    }

    /// Render how a dispatched operation ended.
    pub fn render_outcome(&self, id: &WorkloadId, op: &str, state: RunState, error: Option<&str>) {
        match error {
            None => self.ctx.success(&format!("{op} {id}: {state}")),
            Some(message) => self.ctx.error(&format!("{op} {id} failed: {message}")),
        }
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.1}s", elapsed.as_secs_f64())
}
