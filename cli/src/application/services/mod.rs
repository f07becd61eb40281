//! Application services: use-case orchestration.
//!
//! Each service module composes domain logic with port trait calls. Services
//! import only from `crate::domain` and `crate::application::ports`, never
//! from `crate::infra`, `crate::commands`, or `crate::output`.

pub mod controller;
pub mod poller;
pub mod registry;
pub mod tracker;

pub use controller::{ControllerDeps, WorkloadController};
pub use poller::StatePoller;
pub use registry::{Operation, WorkloadRegistry};
pub use tracker::OperationTracker;
