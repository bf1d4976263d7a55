//! Session settings.
//!
//! ```rust
//! use logic_circuit::config::SessionConfig;
//!
//! let config = SessionConfig::from_json_str(r#"{"clockHalfPeriodMs": 250}"#)?;
//! assert_eq!(config.clock_half_period_ms, 250);
//! assert_eq!(config.default_max_output_connections, 1);
//! # Ok::<(), logic_circuit::config::ConfigError>(())
//! ```

use crate::circuit::{DEFAULT_MAX_OUTPUT_CONNECTIONS, DEFAULT_MAX_PROPAGATION_STEPS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Fan-out bound given to newly created gates
    pub default_max_output_connections: usize,
    /// Time between two flips of a running clock
    pub clock_half_period_ms: u64,
    /// Undoable commands kept, unbounded when absent
    pub history_limit: Option<usize>,
    /// Gate visits a single propagation may make before giving up
    pub max_propagation_steps: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            default_max_output_connections: DEFAULT_MAX_OUTPUT_CONNECTIONS,
            clock_half_period_ms: 500,
            history_limit: None,
            max_propagation_steps: DEFAULT_MAX_PROPAGATION_STEPS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
}

impl SessionConfig {
    /// Parse and validate. Missing keys take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clock_half_period_ms == 0 {
            return Err(ConfigError::Zero("clockHalfPeriodMs"));
        }
        if self.max_propagation_steps == 0 {
            return Err(ConfigError::Zero("maxPropagationSteps"));
        }
        if self.history_limit == Some(0) {
            return Err(ConfigError::Zero("historyLimit"));
        }
        Ok(())
    }

    pub fn clock_half_period(&self) -> Duration {
        Duration::from_millis(self.clock_half_period_ms)
    }
}
