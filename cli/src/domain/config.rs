//! Domain types and validators for deckhand configuration.
//!
//! Pure functions only. Nothing here touches the filesystem or the runtime.

use anyhow::Result;
use deckhand_common::LifecycleConfig;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Constants ────────────────────────────────────────────────────────────────

pub const VALID_CONFIG_KEYS: &[&str] = &[
    "lifecycle.poll_interval_ms",
    "lifecycle.start_timeout_secs",
    "lifecycle.target",
];

/// Accepted poll interval window.
const POLL_INTERVAL_MS_RANGE: std::ops::RangeInclusive<u64> = 50..=60_000;
const START_TIMEOUT_SECS_RANGE: std::ops::RangeInclusive<u64> = 1..=3_600;

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.deckhand/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct DeckhandConfig {
    /// Lifecycle tuning.
    pub lifecycle: LifecycleConfig,
}

impl DeckhandConfig {
    /// Validate and apply a `key = value` pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the key or value fails validation.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_config_key(key)?;
        validate_config_value(key, value)?;
        match key {
            "lifecycle.poll_interval_ms" => self.lifecycle.poll_interval_ms = parse_u64(key, value)?,
            "lifecycle.start_timeout_secs" => {
                self.lifecycle.start_timeout_secs = parse_u64(key, value)?;
            }
            "lifecycle.target" => self.lifecycle.target = value.to_string(),
            _ => anyhow::bail!("Unknown setting: {key}"),
        }
        Ok(())
    }

    /// Check every field against the same rules `set` enforces.
    ///
    /// # Errors
    ///
    /// Returns the first field that fails validation.
    pub fn validate(&self) -> Result<()> {
        let lifecycle = &self.lifecycle;
        validate_config_value(
            "lifecycle.poll_interval_ms",
            &lifecycle.poll_interval_ms.to_string(),
        )?;
        validate_config_value(
            "lifecycle.start_timeout_secs",
            &lifecycle.start_timeout_secs.to_string(),
        )?;
        validate_config_value("lifecycle.target", &lifecycle.target)
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a configuration key against the whitelist.
///
/// # Errors
///
/// Returns an error if the key is not in the allowed list.
pub fn validate_config_key(key: &str) -> Result<()> {
    if !VALID_CONFIG_KEYS.contains(&key) {
        return Err(ConfigError::UnknownKey {
            key: key.to_string(),
            valid: VALID_CONFIG_KEYS.join(", "),
        }
        .into());
    }
    Ok(())
}

/// Validates a configuration value for the given key.
///
/// # Errors
///
/// Returns an error if the value is not valid for the key.
pub fn validate_config_value(key: &str, value: &str) -> Result<()> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    };
    match key {
        "lifecycle.poll_interval_ms" => {
            let ms = parse_u64(key, value)?;
            if !POLL_INTERVAL_MS_RANGE.contains(&ms) {
                return Err(invalid(format!(
                    "Must be between {} and {} milliseconds",
                    POLL_INTERVAL_MS_RANGE.start(),
                    POLL_INTERVAL_MS_RANGE.end()
                ))
                .into());
            }
        }
        "lifecycle.start_timeout_secs" => {
            let secs = parse_u64(key, value)?;
            if !START_TIMEOUT_SECS_RANGE.contains(&secs) {
                return Err(invalid(format!(
                    "Must be between {} and {} seconds",
                    START_TIMEOUT_SECS_RANGE.start(),
                    START_TIMEOUT_SECS_RANGE.end()
                ))
                .into());
            }
        }
        "lifecycle.target" => {
            if value.is_empty() || value.chars().any(char::is_whitespace) {
                return Err(invalid("Target must be non-empty and contain no whitespace".into()).into());
            }
        }
        _ => {}
    }
    Ok(())
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value.parse::<u64>().map_err(|_| {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "Expected a whole number".to_string(),
        }
        .into()
    })
}
