/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Resequencer configuration.
//!
//! Every field has a default, so a partial (or empty) JSON document is a
//! valid configuration.
//!
//! # Examples
//!
//! ```
//! use resequencer::resequencer::ResequencerConfig;
//! use std::time::Duration;
//!
//! let config = ResequencerConfig::from_json(r#"{ "timeout_ms": 500, "reject_old": true }"#).unwrap();
//! assert_eq!(config.timeout(), Duration::from_millis(500));
//! assert!(config.reject_old);
//! assert_eq!(config.capacity, 1000);
//! ```

use super::engine::DEFAULT_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default number of buffered items before producers wait.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default interval between delivery attempts of the stream driver.
pub const DEFAULT_DELIVERY_ATTEMPT_INTERVAL: Duration = Duration::from_millis(1000);

/// Errors raised while loading or validating a [`ResequencerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid JSON for this configuration.
    #[error("failed to parse resequencer config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds a value the resequencer cannot run with.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why the value was refused.
        reason: &'static str,
    },
}

/// Tunables for a resequencer stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResequencerConfig {
    /// How long an isolated item waits for its predecessor, in milliseconds.
    pub timeout_ms: u64,

    /// Reject items ordering before the last delivered item.
    pub reject_old: bool,

    /// Buffered items allowed before producers wait.
    pub capacity: usize,

    /// Interval between delivery attempts, in milliseconds.
    pub delivery_attempt_interval_ms: u64,

    /// Drop invalid items instead of failing the insertion.
    pub ignore_invalid: bool,
}

impl Default for ResequencerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            reject_old: false,
            capacity: DEFAULT_CAPACITY,
            delivery_attempt_interval_ms: DEFAULT_DELIVERY_ATTEMPT_INTERVAL.as_millis() as u64,
            ignore_invalid: false,
        }
    }
}

impl ResequencerConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Parse`] for malformed JSON or mistyped fields
    /// - [`ConfigError::Invalid`] if [`validate`](Self::validate) fails
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every field is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms",
                reason: "must be greater than zero",
            });
        }
        if self.capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "capacity",
                reason: "must be greater than zero",
            });
        }
        if self.delivery_attempt_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "delivery_attempt_interval_ms",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the reject-old policy.
    #[must_use]
    pub fn with_reject_old(mut self, reject_old: bool) -> Self {
        self.reject_old = reject_old;
        self
    }

    /// Sets the capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the delivery attempt interval.
    #[must_use]
    pub fn with_delivery_attempt_interval(mut self, interval: Duration) -> Self {
        self.delivery_attempt_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the ignore-invalid policy.
    #[must_use]
    pub fn with_ignore_invalid(mut self, ignore_invalid: bool) -> Self {
        self.ignore_invalid = ignore_invalid;
        self
    }

    /// Timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delivery attempt interval as a [`Duration`].
    #[must_use]
    pub fn delivery_attempt_interval(&self) -> Duration {
        Duration::from_millis(self.delivery_attempt_interval_ms)
    }
}
