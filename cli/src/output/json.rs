//! JSON output helpers.
//!
//! Every `--json` code path prints one pretty-printed object per event, and
//! failures use the shared error object from [`format_error`].

use std::time::Duration;

use anyhow::{Context, Result};
use deckhand_common::{RunState, WorkloadId};

use crate::domain::config::DeckhandConfig;

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Renders domain types as JSON on stdout.
pub struct JsonRenderer;

impl JsonRenderer {
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_config(config: &DeckhandConfig, path: &std::path::Path) -> Result<()> {
        let obj = serde_json::json!({
            "path": path.display().to_string(),
            "config": config,
        });
        println!("{}", serde_json::to_string_pretty(&obj).context("JSON serialization failed")?);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_transition(id: &WorkloadId, state: RunState, elapsed: Duration) -> Result<()> {
        let obj = serde_json::json!({
            "workload": id.to_string(),
            "state": state,
            "elapsed_ms": u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        });
        println!("{}", serde_json::to_string(&obj).context("JSON serialization failed")?);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_outcome(
        id: &WorkloadId,
        op: &str,
        state: RunState,
        error: Option<&str>,
    ) -> Result<()> {
        let obj = serde_json::json!({
            "workload": id.to_string(),
            "operation": op,
            "state": state,
            "success": error.is_none(),
            "error": error,
        });
        println!("{}", serde_json::to_string_pretty(&obj).context("JSON serialization failed")?);
        Ok(())
    }
}
