//! Event types for the engine's event bus

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::Value;

/// Event name identifier
///
/// Plain published events carry arbitrary names; events derived by the
/// engine use the `threshold:` / `time:` / `state_changed` prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventName(String);

impl EventName {
    /// Create a new event name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EventName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event published on the bus
///
/// Immutable once published. The timestamp is monotonic time from the
/// injected clock, so pattern windows and sustain timers are deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// The event name
    pub name: EventName,

    /// Monotonic time at which the event was published
    pub timestamp: Duration,

    /// Opaque payload
    #[serde(default)]
    pub payload: HashMap<String, Value>,
}

impl Event {
    /// Create a new event
    pub fn new(
        name: impl Into<EventName>,
        timestamp: Duration,
        payload: HashMap<String, Value>,
    ) -> Self {
        Self {
            name: name.into(),
            timestamp,
            payload,
        }
    }
}
