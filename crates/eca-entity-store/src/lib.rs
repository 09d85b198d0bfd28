//! Entity signal storage for the ECA engine
//!
//! This crate provides the EntityStore, which tracks the current numeric and
//! string signal values of all entities. Numeric writes are evaluated against
//! the installed threshold watches; a crossing publishes a derived
//! `threshold:{entity}:{direction}:{threshold}` event on the bus (suffixed
//! `:sustained:{ms}` when the watch carries a sustain duration and the value
//! is still beyond the threshold after it elapses).

use dashmap::DashMap;
use eca_core::{SharedClock, Value};
use eca_event_bus::SharedEventBus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, trace};

/// Event name published when a string signal changes
pub const STATE_CHANGED: &str = "state_changed";

/// Which side of a threshold a watch fires on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Above,
    Below,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Above => write!(f, "above"),
            Direction::Below => write!(f, "below"),
        }
    }
}

/// A registered threshold crossing watch
///
/// Installed wholesale by the engine when a rule set is loaded; one watch per
/// numeric-threshold trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdWatch {
    /// Numeric entity the watch observes
    pub entity: String,
    /// Side of the threshold that fires
    pub direction: Direction,
    /// Threshold value
    pub threshold: f64,
    /// If set, the value must stay beyond the threshold for this long
    /// before the `:sustained:{ms}` event is published
    pub sustain_for: Option<Duration>,
}

impl ThresholdWatch {
    /// Whether a value is beyond this watch's threshold
    pub fn beyond(&self, value: f64) -> bool {
        match self.direction {
            Direction::Above => value > self.threshold,
            Direction::Below => value < self.threshold,
        }
    }

    /// The event name this watch publishes on a crossing
    pub fn event_name(&self) -> String {
        threshold_event_name(&self.entity, self.direction, self.threshold)
    }
}

/// Derived event name for a threshold crossing
pub fn threshold_event_name(entity: &str, direction: Direction, threshold: f64) -> String {
    format!("threshold:{}:{}:{}", entity, direction, threshold)
}

/// The entity store tracks all numeric and string signal values
///
/// Writes are compare-and-publish: an unchanged value is a no-op, a changed
/// numeric value is evaluated against the threshold watches for that entity.
/// No internal lock is held across a bus publish, so re-entrant writes from
/// an event subscriber cannot deadlock.
pub struct EntityStore {
    /// Numeric signal values
    numeric: DashMap<String, f64>,
    /// String signal values
    states: DashMap<String, String>,
    /// Installed threshold watches, swapped wholesale on rule set load
    watches: RwLock<Arc<Vec<ThresholdWatch>>>,
    /// Bus for derived events
    bus: SharedEventBus,
    /// Clock for sustain timers
    clock: SharedClock,
}

impl EntityStore {
    /// Create a new entity store publishing on the given bus
    pub fn new(bus: SharedEventBus, clock: SharedClock) -> Self {
        Self {
            numeric: DashMap::new(),
            states: DashMap::new(),
            watches: RwLock::new(Arc::new(Vec::new())),
            bus,
            clock,
        }
    }

    /// Replace the installed threshold watches
    pub fn set_threshold_watches(&self, watches: Vec<ThresholdWatch>) {
        debug!(count = watches.len(), "Installing threshold watches");
        // The one place the watch lock is taken for writing
        *self.watches.write().expect("watch lock poisoned") = Arc::new(watches);
    }

    /// Snapshot of the installed watches; no lock held after this returns
    fn watch_snapshot(&self) -> Arc<Vec<ThresholdWatch>> {
        self.watches.read().expect("watch lock poisoned").clone()
    }

    /// Set a numeric signal value
    ///
    /// If the value changed, every installed watch for the entity is checked
    /// for a crossing (old value not beyond, new value beyond).
    pub fn set_numeric(self: &Arc<Self>, entity: &str, value: f64) {
        let old = self.numeric.get(entity).map(|v| *v);
        if old == Some(value) {
            trace!(entity, value, "Numeric value unchanged");
            return;
        }
        self.numeric.insert(entity.to_string(), value);
        debug!(entity, ?old, value, "Numeric value set");

        // Snapshot the watches so no lock is held while publishing
        let watches = self.watch_snapshot();
        for watch in watches.iter().filter(|w| w.entity == entity) {
            let was_beyond = old.map(|v| watch.beyond(v)).unwrap_or(false);
            if was_beyond || !watch.beyond(value) {
                continue;
            }
            match watch.sustain_for {
                None => {
                    debug!(entity, threshold = watch.threshold, direction = %watch.direction,
                        "Threshold crossed");
                    self.bus
                        .publish(watch.event_name(), crossing_payload(entity, value, watch));
                }
                Some(sustain) => self.schedule_sustain_check(watch.clone(), sustain),
            }
        }
    }

    /// Set a string signal value
    ///
    /// Publishes a `state_changed` event when the value differs.
    pub fn set_state(&self, entity: &str, value: &str) {
        let old = self.states.get(entity).map(|v| v.clone());
        if old.as_deref() == Some(value) {
            trace!(entity, value, "State value unchanged");
            return;
        }
        self.states.insert(entity.to_string(), value.to_string());
        debug!(entity, ?old, value, "State value set");

        let mut payload = HashMap::new();
        payload.insert("entity".to_string(), Value::String(entity.to_string()));
        payload.insert(
            "old".to_string(),
            old.map(Value::String).unwrap_or(Value::Null),
        );
        payload.insert("new".to_string(), Value::String(value.to_string()));
        self.bus.publish(STATE_CHANGED, payload);
    }

    /// Current numeric value of an entity
    pub fn numeric(&self, entity: &str) -> Option<f64> {
        self.numeric.get(entity).map(|v| *v)
    }

    /// Current string value of an entity
    pub fn state(&self, entity: &str) -> Option<String> {
        self.states.get(entity).map(|v| v.clone())
    }

    /// Total number of known entities
    pub fn entity_count(&self) -> usize {
        self.numeric.len() + self.states.len()
    }

    /// Re-check a crossed watch after its sustain duration; publish the
    /// `:sustained:{ms}` event if the value is still beyond the threshold.
    fn schedule_sustain_check(self: &Arc<Self>, watch: ThresholdWatch, sustain: Duration) {
        debug!(entity = %watch.entity, ?sustain, "Scheduling sustained threshold check");
        let store = self.clone();
        tokio::spawn(async move {
            store.clock.sleep(sustain).await;
            let current = store.numeric(&watch.entity).unwrap_or(0.0);
            if watch.beyond(current) {
                debug!(entity = %watch.entity, threshold = watch.threshold,
                    "Threshold sustained");
                // The duration is part of the event identity: watches on the
                // same threshold with different sustains stay distinct.
                let name = format!("{}:sustained:{}", watch.event_name(), sustain.as_millis());
                store
                    .bus
                    .publish(name, crossing_payload(&watch.entity, current, &watch));
            } else {
                trace!(entity = %watch.entity, "Threshold not sustained");
            }
        });
    }
}

fn crossing_payload(entity: &str, value: f64, watch: &ThresholdWatch) -> HashMap<String, Value> {
    let mut payload = HashMap::new();
    payload.insert("entity".to_string(), Value::String(entity.to_string()));
    payload.insert("value".to_string(), Value::Number(value));
    payload.insert("threshold".to_string(), Value::Number(watch.threshold));
    payload
}

/// Shared entity store handle
pub type SharedEntityStore = Arc<EntityStore>;
