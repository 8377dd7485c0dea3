//! Reconnect backoff

use std::time::Duration;

use super::TransportOptions;

/// Backoff state for one transport client
///
/// The first failure after a success waits the initial delay; each further
/// consecutive failure multiplies the previous delay by the backoff factor,
/// up to the configured cap. Delays never shrink until [`reset`](Self::reset).
#[derive(Clone, Debug, Default)]
pub struct RetryState {
    current: Option<Duration>,
}

impl RetryState {
    /// Fresh state, as after a successful connect
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay most recently handed out, if any failure happened since the last reset
    #[must_use]
    pub fn current(&self) -> Option<Duration> {
        self.current
    }

    /// Record a failure and return the delay before the next attempt
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn next_delay(&mut self, options: &TransportOptions) -> Duration {
        let initial = options.initial_retry_delay();
        let cap = options.max_retry_delay();

        let next = match self.current {
            None => initial,
            Some(current) => {
                let factor = options.backoff_factor.max(1.0);
                let scaled = current.max(initial).as_nanos() as f64 * factor;
                let capped = scaled.min(cap.as_nanos() as f64);
                Duration::from_nanos(capped as u64)
            }
        };

        let next = next.min(cap);
        self.current = Some(next);
        next
    }

    /// Forget accumulated backoff after a successful connect
    pub fn reset(&mut self) {
        self.current = None;
    }
}
