//! Transport Configuration
//!
//! Reconnect and logging options shared by every transport client. Each
//! client receives its own copy at construction.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Options for one [`TransportClient`](super::TransportClient)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Delay before the first reconnect attempt after a failure, in milliseconds
    pub initial_retry_delay_ms: u64,

    /// Multiplier applied to the delay on each consecutive failure
    pub backoff_factor: f64,

    /// Upper bound for the reconnect delay, in milliseconds
    pub max_retry_delay_ms: u64,

    /// Log every inbound and outbound frame at debug level
    pub log_frames: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            initial_retry_delay_ms: 500,
            backoff_factor: 2.0,
            max_retry_delay_ms: 30_000,
            log_frames: false,
        }
    }
}

impl TransportOptions {
    /// Short delays for tests
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            initial_retry_delay_ms: 100,
            backoff_factor: 2.0,
            max_retry_delay_ms: 10_000,
            log_frames: true,
        }
    }

    /// Delay before the first reconnect attempt
    #[must_use]
    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_millis(self.initial_retry_delay_ms)
    }

    /// Upper bound for the reconnect delay (never below the initial delay)
    #[must_use]
    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms.max(self.initial_retry_delay_ms))
    }

    /// Check the options for values the backoff cannot work with
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_retry_delay_ms == 0 {
            return Err("transport.initial_retry_delay_ms must be positive".to_string());
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(format!(
                "transport.backoff_factor must be a finite number >= 1.0, got {}",
                self.backoff_factor
            ));
        }
        if self.max_retry_delay_ms < self.initial_retry_delay_ms {
            return Err(format!(
                "transport.max_retry_delay_ms ({}) is below initial_retry_delay_ms ({})",
                self.max_retry_delay_ms, self.initial_retry_delay_ms
            ));
        }
        Ok(())
    }
}
