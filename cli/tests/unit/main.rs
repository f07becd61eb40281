//! Unit tests for deckhand CLI
//!
//! These tests use scripted fakes and a paused clock, so they run fast
//! without external I/O.

mod cell_properties;
mod controller_scenarios;
mod registry_scenarios;
