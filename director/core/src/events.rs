//! Live Events
//!
//! The records the judging feed creates, updates and ends, and the immutable
//! [`Snapshot`] the rule engine evaluates.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque event identifier
///
/// The judging server sends numeric ids; they are kept as their decimal
/// string so that ids from any source compare the same way.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    /// Create an id from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Read an id from a JSON number or string
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// The id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One tracked live event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    /// Event identifier
    pub id: EventId,
    /// Descriptive data from the init signal (arena, teams, schedule, ...)
    pub info: Value,
    /// Most recent update payload, merged; `None` until the first update
    pub state: Option<Value>,
}

impl LiveEvent {
    /// Create a record with no state
    #[must_use]
    pub fn new(id: EventId, info: Value) -> Self {
        Self {
            id,
            info,
            state: None,
        }
    }

    /// Arena the event takes place in, if the init payload named one
    #[must_use]
    pub fn arena(&self) -> Option<String> {
        match self.info.get("arena")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Merge an update payload into the state
    ///
    /// Object payloads are merged key by key into an object state, later keys
    /// winning. Anything else replaces the state outright.
    pub fn merge_state(&mut self, update: Value) {
        match (&mut self.state, update) {
            (Some(Value::Object(current)), Value::Object(update)) => {
                current.extend(update);
            }
            (state, update) => *state = Some(update),
        }
    }
}

/// Immutable copy of every tracked event at one instant
///
/// Events are ordered by id. Rules must not rely on that order for meaning;
/// it only makes snapshots comparable and logs stable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    events: Vec<LiveEvent>,
}

impl Snapshot {
    /// Build a snapshot from a list of events
    #[must_use]
    pub fn new(mut events: Vec<LiveEvent>) -> Self {
        events.sort_by(|a, b| a.id.cmp(&b.id));
        Self { events }
    }

    /// Number of events
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events are live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over the events
    pub fn iter(&self) -> std::slice::Iter<'_, LiveEvent> {
        self.events.iter()
    }

    /// Look up one event
    #[must_use]
    pub fn get(&self, id: &EventId) -> Option<&LiveEvent> {
        self.events.iter().find(|e| &e.id == id)
    }

    /// Ids of all events, in snapshot order
    #[must_use]
    pub fn ids(&self) -> Vec<EventId> {
        self.events.iter().map(|e| e.id.clone()).collect()
    }

    /// The events as a slice
    #[must_use]
    pub fn events(&self) -> &[LiveEvent] {
        &self.events
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a LiveEvent;
    type IntoIter = std::slice::Iter<'a, LiveEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_event_id_from_number_and_string() {
        assert_eq!(EventId::from_value(&json!(42)), Some(EventId::new("42")));
        assert_eq!(EventId::from_value(&json!("e1")), Some(EventId::new("e1")));
        assert_eq!(EventId::from_value(&json!("")), None);
        assert_eq!(EventId::from_value(&json!(null)), None);
    }

    #[test]
    fn test_arena_accepts_string_or_number() {
        let a = LiveEvent::new("1".into(), json!({"arena": "A"}));
        let b = LiveEvent::new("2".into(), json!({"arena": 3}));
        let c = LiveEvent::new("3".into(), json!({}));
        assert_eq!(a.arena().as_deref(), Some("A"));
        assert_eq!(b.arena().as_deref(), Some("3"));
        assert_eq!(c.arena(), None);
    }

    #[test]
    fn test_merge_state_merges_objects() {
        let mut event = LiveEvent::new("1".into(), json!({}));
        event.merge_state(json!({"round": 1, "score": [0, 0]}));
        event.merge_state(json!({"score": [1, 0]}));
        assert_eq!(event.state, Some(json!({"round": 1, "score": [1, 0]})));
    }

    #[test]
    fn test_merge_state_replaces_non_objects() {
        let mut event = LiveEvent::new("1".into(), json!({}));
        event.merge_state(json!({"round": 1}));
        event.merge_state(json!("finished"));
        assert_eq!(event.state, Some(json!("finished")));
    }

    #[test]
    fn test_snapshot_is_ordered_by_id() {
        let snapshot = Snapshot::new(vec![
            LiveEvent::new("b".into(), json!({})),
            LiveEvent::new("a".into(), json!({})),
        ]);
        assert_eq!(snapshot.ids(), vec![EventId::new("a"), EventId::new("b")]);
        assert!(snapshot.get(&EventId::new("b")).is_some());
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_snapshot_serializes_as_list() {
        let snapshot = Snapshot::new(vec![LiveEvent::new("1".into(), json!({"arena": "A"}))]);
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            value,
            json!([{"id": "1", "info": {"arena": "A"}, "state": null}])
        );
    }
}
