//! Rule definition
//!
//! A rule ties triggers, conditions and actions together with a run mode.
//! Rules are immutable once a set is installed; the active set is always
//! replaced wholesale, never patched in place.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::Action;
use crate::condition::Condition;
use crate::trigger::{Trigger, TriggerError};

/// Rule errors
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Rule has an empty id")]
    EmptyId,

    #[error("Duplicate rule id: {0}")]
    DuplicateId(String),

    #[error("Trigger error: {0}")]
    Trigger(#[from] TriggerError),
}

/// Result type for rule operations
pub type RuleResult<T> = Result<T, RuleError>;

/// Concurrency policy for overlapping triggers of one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Drop new triggers while a run is in flight
    #[default]
    Single,

    /// Cancel the in-flight run and start fresh
    Restart,

    /// Run one at a time, queueing the rest in FIFO order
    Queued,

    /// Every trigger starts an independent run
    Parallel,
}

/// A complete rule definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique identifier
    pub id: String,

    /// Concurrency policy
    #[serde(default)]
    pub mode: RunMode,

    /// Triggers that propose the rule (OR semantics)
    #[serde(default)]
    pub triggers: Vec<Trigger>,

    /// Conditions gating execution (AND semantics, empty passes)
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Actions executed when the rule fires
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    /// Validate rule-level invariants
    ///
    /// Per-trigger validation happens during index construction so a single
    /// malformed trigger only disables itself, not the whole rule.
    pub fn validate(&self) -> RuleResult<()> {
        if self.id.is_empty() {
            return Err(RuleError::EmptyId);
        }
        Ok(())
    }
}
