pub mod config;
pub mod run_state;
pub mod types;

pub use config::LifecycleConfig;
pub use run_state::{ParseStatusError, ReplicaStatus, RunState};
pub use types::*;
