//! Rule Engine
//!
//! An ordered list of `(predicate, action)` pairs evaluated against a
//! [`Snapshot`]. The first predicate that holds selects the action; later
//! rules are not consulted.
//!
//! Rules come from two places:
//! - declarative [`Condition`]s, usually loaded from the `[[rules]]` table of
//!   the configuration file
//! - custom closures registered in code with [`Rule::custom`]

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::events::{LiveEvent, Snapshot};

// ============================================================================
// Actions
// ============================================================================

/// What the device should do
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Switch the program output to the named scene
    SetScene {
        /// Scene name as known to the device
        scene: String,
    },
}

impl Action {
    /// Shorthand for [`Action::SetScene`]
    pub fn set_scene(scene: impl Into<String>) -> Self {
        Self::SetScene {
            scene: scene.into(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetScene { scene } => write!(f, "SetScene({scene})"),
        }
    }
}

// ============================================================================
// Predicates
// ============================================================================

/// Predicate failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// The predicate reported an error
    #[error("rule '{rule}' failed: {reason}")]
    Predicate {
        /// Rule name
        rule: String,
        /// Reason given by the predicate
        reason: String,
    },

    /// The predicate panicked
    #[error("rule '{rule}' panicked: {message}")]
    Panicked {
        /// Rule name
        rule: String,
        /// Panic payload, if it was a string
        message: String,
    },
}

impl RuleError {
    /// Failure raised from inside a custom predicate
    ///
    /// The engine fills in the rule name.
    pub fn predicate(reason: impl Into<String>) -> Self {
        Self::Predicate {
            rule: String::new(),
            reason: reason.into(),
        }
    }

    fn named(self, name: &str) -> Self {
        match self {
            Self::Predicate { reason, .. } => Self::Predicate {
                rule: name.to_string(),
                reason,
            },
            Self::Panicked { message, .. } => Self::Panicked {
                rule: name.to_string(),
                message,
            },
        }
    }
}

/// Declarative predicate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum Condition {
    /// Some live event takes place in the given arena
    Arena {
        /// Arena identifier
        arena: String,
    },
    /// At least one event is live
    Anything,
    /// No events are live
    Nothing,
    /// Some live event has `value` at the dotted `field` path
    ///
    /// Paths start at `id`, `info` or `state`, e.g. `state.phase`.
    FieldEquals {
        /// Dotted path
        field: String,
        /// Expected value
        value: Value,
    },
    /// Always holds
    Otherwise,
}

impl Condition {
    /// Evaluate against a snapshot
    #[must_use]
    pub fn holds(&self, snapshot: &Snapshot) -> bool {
        match self {
            Self::Arena { arena } => snapshot
                .iter()
                .any(|e| e.arena().as_deref() == Some(arena.as_str())),
            Self::Anything => !snapshot.is_empty(),
            Self::Nothing => snapshot.is_empty(),
            Self::FieldEquals { field, value } => snapshot
                .iter()
                .any(|e| lookup(e, field).is_some_and(|v| v == *value)),
            Self::Otherwise => true,
        }
    }
}

fn lookup(event: &LiveEvent, path: &str) -> Option<Value> {
    let mut parts = path.split('.');
    let root = match parts.next()? {
        "id" if path == "id" => return Some(Value::String(event.id.0.clone())),
        "info" => &event.info,
        "state" => event.state.as_ref()?,
        _ => return None,
    };
    let mut current = root;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

type CustomPredicate = Arc<dyn Fn(&Snapshot) -> Result<bool, RuleError> + Send + Sync>;

#[derive(Clone)]
enum Predicate {
    Condition(Condition),
    Custom(CustomPredicate),
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Condition(c) => c.fmt(f),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

/// One `(predicate, action)` pair
#[derive(Clone, Debug)]
pub struct Rule {
    name: String,
    predicate: Predicate,
    action: Action,
}

impl Rule {
    /// Rule from a declarative condition
    pub fn new(name: impl Into<String>, condition: Condition, action: Action) -> Self {
        Self {
            name: name.into(),
            predicate: Predicate::Condition(condition),
            action,
        }
    }

    /// Holds when an event in `arena` is live
    pub fn arena(arena: impl Into<String>, action: Action) -> Self {
        let arena = arena.into();
        Self::new(format!("arena {arena}"), Condition::Arena { arena }, action)
    }

    /// Holds when any event is live
    #[must_use]
    pub fn anything(action: Action) -> Self {
        Self::new("anything", Condition::Anything, action)
    }

    /// Always holds
    #[must_use]
    pub fn otherwise(action: Action) -> Self {
        Self::new("otherwise", Condition::Otherwise, action)
    }

    /// Rule with a predicate written in code
    pub fn custom<F>(name: impl Into<String>, predicate: F, action: Action) -> Self
    where
        F: Fn(&Snapshot) -> Result<bool, RuleError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Predicate::Custom(Arc::new(predicate)),
            action,
        }
    }

    /// Rule name, used in logs
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Action selected when the predicate holds
    #[must_use]
    pub fn action(&self) -> &Action {
        &self.action
    }

    fn matches(&self, snapshot: &Snapshot) -> Result<bool, RuleError> {
        match &self.predicate {
            Predicate::Condition(condition) => Ok(condition.holds(snapshot)),
            Predicate::Custom(predicate) => {
                match catch_unwind(AssertUnwindSafe(|| predicate(snapshot))) {
                    Ok(result) => result.map_err(|e| e.named(&self.name)),
                    Err(payload) => Err(RuleError::Panicked {
                        rule: self.name.clone(),
                        message: panic_message(payload.as_ref()),
                    }),
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Rule as written in the configuration file
///
/// ```toml
/// [[rules]]
/// when = "arena"
/// arena = "A"
/// scene = "Arena A"
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Predicate
    #[serde(flatten)]
    pub condition: Condition,
    /// Scene to switch to
    pub scene: String,
    /// Optional name for logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RuleSpec {
    fn into_rule(self, index: usize) -> Rule {
        let name = self
            .name
            .unwrap_or_else(|| format!("#{} {}", index + 1, condition_label(&self.condition)));
        Rule::new(name, self.condition, Action::set_scene(self.scene))
    }
}

fn condition_label(condition: &Condition) -> String {
    match condition {
        Condition::Arena { arena } => format!("arena {arena}"),
        Condition::Anything => "anything".into(),
        Condition::Nothing => "nothing".into(),
        Condition::FieldEquals { field, value } => format!("{field} == {value}"),
        Condition::Otherwise => "otherwise".into(),
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Ordered rule list
#[derive(Clone, Debug, Default)]
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl RuleEngine {
    /// Engine evaluating `rules` in the given order
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Engine built from configuration entries
    #[must_use]
    pub fn from_specs(specs: Vec<RuleSpec>) -> Self {
        Self::new(
            specs
                .into_iter()
                .enumerate()
                .map(|(i, spec)| spec.into_rule(i))
                .collect(),
        )
    }

    /// Rules in evaluation order
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First matching action, or the first predicate error
    ///
    /// # Errors
    ///
    /// Returns the [`RuleError`] of the first predicate that fails or panics.
    /// Rules after it are not evaluated.
    pub fn try_evaluate(&self, snapshot: &Snapshot) -> Result<Option<Action>, RuleError> {
        for rule in &self.rules {
            if rule.matches(snapshot)? {
                debug!(rule = %rule.name, action = %rule.action, "Rule matched");
                return Ok(Some(rule.action.clone()));
            }
        }
        Ok(None)
    }

    /// First matching action; errors are logged and yield `None`
    #[must_use]
    pub fn evaluate(&self, snapshot: &Snapshot) -> Option<Action> {
        match self.try_evaluate(snapshot) {
            Ok(action) => action,
            Err(e) => {
                warn!(error = %e, "Rule evaluation failed, leaving device unchanged");
                None
            }
        }
    }
}
