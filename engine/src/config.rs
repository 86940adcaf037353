//! Configuration for adapters.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::env;

/// Default simulated round-trip latency of the fixture adapter.
pub const DEFAULT_LATENCY_MS: Timestamp = 50;

/// Fixture adapter configuration.
///
/// `simulate_remote_response` selects the latency policy: when true every
/// response is delayed by `latency_ms`, when false it is delivered at the end
/// of the current run-loop tick with zero delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FixtureConfig {
    pub simulate_remote_response: bool,
    pub latency_ms: Timestamp,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            simulate_remote_response: true,
            latency_ms: DEFAULT_LATENCY_MS,
        }
    }
}

impl FixtureConfig {
    /// Respond at the end of the current tick instead of after a delay.
    pub fn immediate() -> Self {
        Self {
            simulate_remote_response: false,
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let simulate_remote_response = match env::var("TETHER_SIMULATE_REMOTE_RESPONSE") {
            Ok(value) => parse_bool(&value).ok_or(ConfigError::InvalidSimulateRemoteResponse)?,
            Err(_) => defaults.simulate_remote_response,
        };

        let latency_ms = match env::var("TETHER_FIXTURE_LATENCY_MS") {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidLatency)?,
            Err(_) => defaults.latency_ms,
        };

        Ok(Self {
            simulate_remote_response,
            latency_ms,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TETHER_SIMULATE_REMOTE_RESPONSE value")]
    InvalidSimulateRemoteResponse,

    #[error("Invalid TETHER_FIXTURE_LATENCY_MS value")]
    InvalidLatency,
}
