//! Action types
//!
//! Actions form a tree: a rule's action list is executed sequentially, and
//! `Repeat` nests arbitrary sub-trees. Execution semantics live in the
//! engine's executor; this module only defines the model.

use eca_core::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::trigger::duration_ms;

/// A single action node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Delegate to the Service collaborator
    ServiceCall(ServiceCallAction),

    /// Suspend for a duration (or until cancelled)
    Wait(WaitAction),

    /// Execute a nested sequence a fixed number of times
    Repeat(RepeatAction),

    /// Halt the current run: remaining siblings and all enclosing repeats
    Stop,
}

/// Service call action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCallAction {
    /// Opaque service identifier
    pub service: String,

    /// Opaque call data, passed through uninterpreted
    #[serde(default)]
    pub data: HashMap<String, Value>,
}

/// Wait action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitAction {
    /// How long to wait
    #[serde(rename = "ms", with = "duration_ms")]
    pub duration: Duration,
}

/// Counted repeat action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatAction {
    /// Number of iterations
    pub count: u32,

    /// Body executed each iteration; may nest any action including repeats
    #[serde(default)]
    pub sequence: Vec<Action>,
}
