//! Trigger types
//!
//! Triggers describe the event/signal patterns that propose a rule for
//! execution. A rule may mix trigger kinds; any one firing is sufficient.

use eca_entity_store::Direction;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Trigger errors
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Invalid trigger configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for trigger operations
pub type TriggerResult<T> = Result<T, TriggerError>;

/// Trigger definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum Trigger {
    /// Fires on a named event
    Event(EventTrigger),

    /// Fires when a numeric signal crosses a threshold
    NumericThreshold(NumericThresholdTrigger),

    /// Fires on a fixed interval
    TimeSchedule(TimeScheduleTrigger),

    /// Fires when an ordered event sequence completes inside a window
    PatternSequence(PatternSequenceTrigger),
}

impl Trigger {
    /// Get the trigger kind name
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::Event(_) => "event",
            Trigger::NumericThreshold(_) => "numeric_threshold",
            Trigger::TimeSchedule(_) => "time_schedule",
            Trigger::PatternSequence(_) => "pattern_sequence",
        }
    }

    /// Validate the trigger configuration
    ///
    /// Malformed triggers are rejected at load time; the owning rule stays
    /// active for its remaining triggers.
    pub fn validate(&self) -> TriggerResult<()> {
        match self {
            Trigger::Event(t) => {
                if t.name.is_empty() {
                    return Err(TriggerError::InvalidConfig(
                        "event trigger has an empty name".to_string(),
                    ));
                }
            }
            Trigger::NumericThreshold(t) => {
                if t.entity.is_empty() {
                    return Err(TriggerError::InvalidConfig(
                        "numeric threshold trigger has an empty entity".to_string(),
                    ));
                }
                if !t.threshold.is_finite() {
                    return Err(TriggerError::InvalidConfig(format!(
                        "numeric threshold for '{}' is not finite",
                        t.entity
                    )));
                }
            }
            Trigger::TimeSchedule(t) => {
                if t.every.is_zero() {
                    return Err(TriggerError::InvalidConfig(
                        "time schedule interval must be positive".to_string(),
                    ));
                }
            }
            Trigger::PatternSequence(t) => {
                if t.steps.is_empty() {
                    return Err(TriggerError::InvalidConfig(
                        "pattern sequence has no steps".to_string(),
                    ));
                }
                if t.window.is_zero() {
                    return Err(TriggerError::InvalidConfig(
                        "pattern sequence window must be positive".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Named event trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTrigger {
    /// Event name to match
    pub name: String,
}

/// Numeric threshold crossing trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericThresholdTrigger {
    /// Numeric entity to observe
    pub entity: String,

    /// Side of the threshold that fires
    pub direction: Direction,

    /// Threshold value
    pub threshold: f64,

    /// Value must stay beyond the threshold for this long before firing
    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        with = "option_duration_ms"
    )]
    pub sustain_for: Option<Duration>,
}

/// Fixed interval trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeScheduleTrigger {
    /// Interval between firings
    #[serde(with = "duration_ms")]
    pub every: Duration,
}

/// Ordered event sequence trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSequenceTrigger {
    /// Event names that must occur in order
    pub steps: Vec<String>,

    /// Rolling window the whole sequence must fit inside
    #[serde(with = "duration_ms")]
    pub window: Duration,
}

// --- Duration serde helpers (integer milliseconds) ---

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

pub(crate) mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<u64> = Option::deserialize(deserializer)?;
        Ok(opt.map(Duration::from_millis))
    }
}
