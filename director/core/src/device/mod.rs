//! Device Control
//!
//! Actions selected by the rule engine are plain data. A [`DeviceExecutor`]
//! turns them into calls on the controlled device; [`DeviceClient`] sits in
//! front of it and remembers what was last applied.
//!
//! # Connection awareness
//!
//! While the executor reports the device as disconnected, `apply` defers and
//! forgets the last applied action. A reconnect that happened between two
//! applies shows up as a new connection epoch and has the same effect. The
//! next apply after reconnect therefore always reaches the device, even if
//! the chosen action did not change.

pub mod obs;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::rules::Action;

pub use obs::{auth_response, ObsExecutor, ObsMessage, ObsResponse};

/// Errors from executing an action on the device
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device is not connected (or not yet authenticated)
    #[error("device not connected")]
    NotConnected,

    /// The connection dropped while a request was outstanding
    #[error("device disconnected before responding")]
    Disconnected,

    /// No response within the request timeout
    #[error("device did not respond within {0:?}")]
    Timeout(Duration),

    /// The device answered with an error
    #[error("{request} rejected: {reason}")]
    Rejected {
        /// Request type
        request: String,
        /// Error text from the device
        reason: String,
    },

    /// Authentication was refused
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Unexpected response shape
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Performs actions on a concrete device
#[async_trait]
pub trait DeviceExecutor: Send + Sync + 'static {
    /// Execute one action
    async fn execute(&self, action: &Action) -> Result<(), DeviceError>;

    /// Whether the device can currently accept actions
    fn is_connected(&self) -> bool;

    /// Counter that changes every time a new connection becomes usable
    fn connection_epoch(&self) -> u64 {
        0
    }
}

/// Result of [`DeviceClient::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOutcome {
    /// The action was executed
    Applied,
    /// The action equals the last applied one; nothing was sent
    Unchanged,
    /// The device is disconnected; the action will be applied after reconnect
    Deferred,
}

/// Executor wrapper that skips redundant actions
#[derive(Debug)]
pub struct DeviceClient<E> {
    executor: E,
    last_applied: Option<Action>,
    epoch: u64,
}

impl<E: DeviceExecutor> DeviceClient<E> {
    /// Wrap an executor
    pub fn new(executor: E) -> Self {
        let epoch = executor.connection_epoch();
        Self {
            executor,
            last_applied: None,
            epoch,
        }
    }

    /// Apply an action unless it is already in effect
    ///
    /// # Errors
    ///
    /// Propagates the executor's error. The last applied action is only
    /// updated on success, so a failed action is retried on the next apply.
    pub async fn apply(&mut self, action: &Action) -> Result<DeviceOutcome, DeviceError> {
        if !self.executor.is_connected() {
            if self.last_applied.take().is_some() {
                debug!("Device disconnected, forgetting last applied action");
            }
            return Ok(DeviceOutcome::Deferred);
        }

        let epoch = self.executor.connection_epoch();
        if epoch != self.epoch {
            self.epoch = epoch;
            if self.last_applied.take().is_some() {
                debug!(epoch, "Device reconnected, forgetting last applied action");
            }
        }

        if self.last_applied.as_ref() == Some(action) {
            return Ok(DeviceOutcome::Unchanged);
        }

        self.executor.execute(action).await?;
        info!(action = %action, "Applied action");
        self.last_applied = Some(action.clone());
        Ok(DeviceOutcome::Applied)
    }

    /// Action most recently applied successfully
    #[must_use]
    pub fn last_applied(&self) -> Option<&Action> {
        self.last_applied.as_ref()
    }

    /// The wrapped executor
    pub fn executor(&self) -> &E {
        &self.executor
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;

    /// Executor recording every action it receives
    #[derive(Clone, Default)]
    pub struct RecordingExecutor {
        pub executed: Arc<Mutex<Vec<Action>>>,
        pub disconnected: Arc<AtomicBool>,
        pub fail_with: Arc<Mutex<Option<DeviceError>>>,
        pub epoch: Arc<AtomicU64>,
    }

    impl RecordingExecutor {
        pub fn executed(&self) -> Vec<Action> {
            self.executed.lock().clone()
        }

        pub fn set_connected(&self, connected: bool) {
            self.disconnected.store(!connected, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl DeviceExecutor for RecordingExecutor {
        async fn execute(&self, action: &Action) -> Result<(), DeviceError> {
            if let Some(err) = self.fail_with.lock().clone() {
                return Err(err);
            }
            self.executed.lock().push(action.clone());
            Ok(())
        }

        fn is_connected(&self) -> bool {
            !self.disconnected.load(Ordering::SeqCst)
        }

        fn connection_epoch(&self) -> u64 {
            self.epoch.load(Ordering::SeqCst)
        }
    }
}
