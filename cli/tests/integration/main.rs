//! Integration tests for deckhand CLI
//!
//! These tests run the compiled binary and verify its observable behaviour.
//! Every test that reads configuration points `DECKHAND_CONFIG` at a temp path.

mod config_command;
mod simulate_command;
