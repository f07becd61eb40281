//! Output styles using owo-colors stylesheet pattern

use deckhand_common::RunState;
use owo_colors::Style;

/// Centralized stylesheet for CLI output colors.
#[derive(Default, Clone)]
pub struct Styles {
    /// Success messages (green)
    pub success: Style,
    /// Warning messages (yellow)
    pub warning: Style,
    /// Error messages (red)
    pub error: Style,
    /// Info messages (blue)
    pub info: Style,
    /// Dimmed/secondary text
    pub dim: Style,
    /// Bold text
    pub bold: Style,
    /// Headers/section titles
    pub header: Style,
    /// Progress arrows (cyan)
    pub progress: Style,
    /// Debugging run state (magenta)
    pub debugging: Style,
}

impl Styles {
    /// Apply colors to the stylesheet.
    pub fn colorize(&mut self) {
        self.success = Style::new().green();
        self.warning = Style::new().yellow();
        self.error = Style::new().red();
        self.info = Style::new().blue();
        self.dim = Style::new().dimmed();
        self.bold = Style::new().bold();
        self.header = Style::new().bold().cyan();
        self.progress = Style::new().cyan();
        self.debugging = Style::new().magenta();
    }

    /// Style for a run-state label.
    #[must_use]
    pub fn run_state(&self, state: RunState) -> Style {
        match state {
            RunState::Running => self.success,
            RunState::Starting => self.warning,
            RunState::Flapping | RunState::Crashed => self.error,
            RunState::Debugging => self.debugging,
            RunState::Inactive | RunState::Unknown => self.dim,
        }
    }
}
