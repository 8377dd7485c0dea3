//! Event Aggregate Store
//!
//! Keeps the latest known state of every live event and raises a change
//! signal after each successful mutation.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  init/update/end   ┌──────────────┐  changed()  ┌────────────────┐
//! │ EventFeed  │ ─────────────────► │  EventStore  │ ──────────► │ ChangeListener │
//! └────────────┘                    └──────────────┘             └────────────────┘
//!                                          │ snapshot()
//!                                          ▼
//!                                     ApplyScheduler
//! ```
//!
//! The store is the single owner of event records. Readers only ever see
//! value copies via [`EventStore::snapshot`].

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::events::{EventId, LiveEvent, Snapshot};

/// Receives a notification after every successful store mutation
pub trait ChangeListener: Send + Sync {
    /// Called once per mutation, after the lock is released
    fn changed(&self);
}

/// Listener that ignores every notification
#[derive(Debug, Default)]
pub struct NoopListener;

impl ChangeListener for NoopListener {
    fn changed(&self) {}
}

/// Errors from store mutations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Update for an event that was never initialized (or already ended)
    #[error("update for unknown event {0}")]
    UnknownEvent(EventId),
}

/// Thread-safe map of live events
#[derive(Clone)]
pub struct EventStore {
    events: Arc<RwLock<BTreeMap<EventId, LiveEvent>>>,
    listener: Arc<dyn ChangeListener>,
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("events", &self.events.read().len())
            .finish_non_exhaustive()
    }
}

impl EventStore {
    /// Create an empty store that notifies `listener` on change
    pub fn new(listener: Arc<dyn ChangeListener>) -> Self {
        Self {
            events: Arc::new(RwLock::new(BTreeMap::new())),
            listener,
        }
    }

    /// Create a store without a listener
    #[must_use]
    pub fn detached() -> Self {
        Self::new(Arc::new(NoopListener))
    }

    /// Create or overwrite an event with empty state
    ///
    /// A second init for the same id (a restarted match) resets the record.
    pub fn init_event(&self, id: EventId, info: Value) {
        info!(event_id = %id, "+++ Init event");
        {
            let mut events = self.events.write();
            events.insert(id.clone(), LiveEvent::new(id, info));
        }
        self.listener.changed();
    }

    /// Merge an update into an existing event
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownEvent`] if the id is not tracked. The
    /// store is left unchanged and no signal is raised.
    pub fn update_event(&self, id: &EventId, state: Value) -> Result<(), StoreError> {
        {
            let mut events = self.events.write();
            let event = events
                .get_mut(id)
                .ok_or_else(|| StoreError::UnknownEvent(id.clone()))?;
            event.merge_state(state);
        }
        debug!(event_id = %id, "Updated event");
        self.listener.changed();
        Ok(())
    }

    /// Remove an event
    ///
    /// Returns `false` (and raises no signal) when the id was not tracked.
    pub fn end_event(&self, id: &EventId) -> bool {
        let removed = self.events.write().remove(id).is_some();
        if removed {
            info!(event_id = %id, "--- End event");
            self.listener.changed();
        } else {
            debug!(event_id = %id, "End for unknown event ignored");
        }
        removed
    }

    /// Value copy of all events, ordered by id
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.events.read().values().cloned().collect())
    }

    /// Number of tracked events
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether no events are tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Whether an id is tracked
    #[must_use]
    pub fn contains(&self, id: &EventId) -> bool {
        self.events.read().contains_key(id)
    }
}
