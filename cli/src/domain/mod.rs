//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, or the tokio runtime. All functions are synchronous.

pub mod cancel;
pub mod cell;
pub mod config;
pub mod error;

pub use cancel::{CancelToken, CancellationRegistry};
pub use cell::{Derived, ListenerId, Source, Var, batch};
pub use config::{DeckhandConfig, validate_config_key, validate_config_value};
pub use error::{ConfigError, FailureKind, LifecycleError, OperationFailure};
