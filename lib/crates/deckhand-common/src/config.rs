use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lifecycle tuning shared by every controller in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Pause between two status fetches while waiting for a workload
    /// (default: 1000 ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Budget for a workload to reach `running` after a start-like
    /// operation (default: 120 s)
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,

    /// Deployment target recorded in every workload identity
    #[serde(default = "default_target")]
    pub target: String,
}

impl LifecycleConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_start_timeout_secs() -> u64 {
    120
}

fn default_target() -> String {
    "default".to_string()
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            start_timeout_secs: default_start_timeout_secs(),
            target: default_target(),
        }
    }
}
