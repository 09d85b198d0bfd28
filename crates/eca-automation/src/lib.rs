//! Rule model and evaluation building blocks for the ECA engine
//!
//! A rule is `TRIGGERS (OR) → CONDITIONS (AND) → ACTIONS`, plus a run mode
//! governing overlapping executions. This crate owns the declarative model
//! and the pure evaluation machinery:
//!
//! - [`Rule`], [`Trigger`], [`Condition`], [`Action`] - the data model
//! - [`TriggerIndex`] - canonical-key lookup from incoming events to rules
//! - [`SequenceWatcher`] - stateful pattern sequence matching
//! - [`eval`] - condition evaluation over the entity store
//!
//! Scheduling and action execution live in the engine crate.

pub mod action;
pub mod condition;
pub mod eval;
pub mod index;
pub mod pattern;
pub mod rule;
pub mod trigger;

pub use action::{Action, RepeatAction, ServiceCallAction, WaitAction};
pub use condition::{CompareOp, Condition, NumericCompareCondition, StateEqualsCondition};
pub use index::{canonical_key, event_key, ThresholdEvent, TriggerIndex};
pub use pattern::SequenceWatcher;
pub use rule::{Rule, RuleError, RuleResult, RunMode};
pub use trigger::{
    EventTrigger, NumericThresholdTrigger, PatternSequenceTrigger, TimeScheduleTrigger, Trigger,
    TriggerError, TriggerResult,
};
