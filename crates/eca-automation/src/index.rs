//! Trigger indexing
//!
//! Groups a loaded rule set by canonical trigger key so each incoming event
//! resolves its candidate rules with one hash lookup. Pattern sequence
//! triggers carry per-event state and are tracked separately, one watcher
//! per (rule, trigger) pair.

use eca_entity_store::Direction;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::pattern::SequenceWatcher;
use crate::rule::Rule;
use crate::trigger::{NumericThresholdTrigger, Trigger};

/// Index from canonical trigger key to candidate rule ids
pub struct TriggerIndex {
    by_key: HashMap<String, Vec<String>>,
    watchers: Vec<SequenceWatcher>,
}

impl TriggerIndex {
    /// Build an index from a rule set
    ///
    /// Malformed triggers are logged and skipped; their rules remain indexed
    /// for any remaining valid triggers.
    pub fn build(rules: &[Arc<Rule>]) -> Self {
        let mut by_key: HashMap<String, Vec<String>> = HashMap::new();
        let mut watchers = Vec::new();

        for rule in rules {
            for trigger in &rule.triggers {
                if let Err(err) = trigger.validate() {
                    warn!(rule_id = %rule.id, kind = trigger.kind(), %err,
                        "Rejecting malformed trigger");
                    continue;
                }
                match trigger {
                    Trigger::PatternSequence(t) => {
                        watchers.push(SequenceWatcher::new(rule.id.clone(), t));
                    }
                    _ => {
                        // Canonical key exists for every non-pattern kind
                        if let Some(key) = canonical_key(trigger) {
                            let candidates = by_key.entry(key).or_default();
                            if !candidates.contains(&rule.id) {
                                candidates.push(rule.id.clone());
                            }
                        }
                    }
                }
            }
        }

        debug!(
            keys = by_key.len(),
            watchers = watchers.len(),
            "Built trigger index"
        );
        Self { by_key, watchers }
    }

    /// Candidate rule ids for a canonical key
    pub fn candidates(&self, key: &str) -> &[String] {
        self.by_key.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Take ownership of the sequence watchers built from the rule set
    pub fn take_watchers(&mut self) -> Vec<SequenceWatcher> {
        std::mem::take(&mut self.watchers)
    }

    /// Number of distinct canonical keys
    pub fn key_count(&self) -> usize {
        self.by_key.len()
    }

    /// Distinct schedule intervals (in milliseconds) present in the index
    pub fn schedule_intervals(&self) -> Vec<u64> {
        let mut intervals: Vec<u64> = self
            .by_key
            .keys()
            .filter_map(|k| k.strip_prefix("time:"))
            .filter_map(|ms| ms.parse().ok())
            .collect();
        intervals.sort_unstable();
        intervals.dedup();
        intervals
    }
}

/// Canonical key for a non-pattern trigger
///
/// - `event:{name}`
/// - `num:above:{entity}` / `num:below:{entity}`
/// - `time:{interval_ms}`
///
/// Pattern sequence triggers have no canonical key.
pub fn canonical_key(trigger: &Trigger) -> Option<String> {
    match trigger {
        Trigger::Event(t) => Some(format!("event:{}", t.name)),
        Trigger::NumericThreshold(t) => Some(format!("num:{}:{}", t.direction, t.entity)),
        Trigger::TimeSchedule(t) => Some(format!("time:{}", t.every.as_millis())),
        Trigger::PatternSequence(_) => None,
    }
}

/// Derive the canonical lookup key for an incoming event name
///
/// `threshold:` events map back to their `num:` key, `time:` tick events are
/// already canonical, and everything else is a plain named event.
pub fn event_key(event_name: &str) -> String {
    if let Some(crossing) = ThresholdEvent::parse(event_name) {
        return format!("num:{}:{}", crossing.direction, crossing.entity);
    }
    if event_name.starts_with("time:") {
        return event_name.to_string();
    }
    format!("event:{}", event_name)
}

/// A parsed `threshold:{entity}:{direction}:{threshold}[:sustained:{ms}]`
/// event name
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdEvent {
    pub entity: String,
    pub direction: Direction,
    /// Threshold exactly as rendered into the event name
    pub threshold_repr: String,
    /// Sustain duration in milliseconds, if this was a sustained crossing
    pub sustain_ms: Option<u64>,
}

impl ThresholdEvent {
    /// Parse a threshold event name; `None` if the name has another shape
    pub fn parse(event_name: &str) -> Option<Self> {
        let rest = event_name.strip_prefix("threshold:")?;
        // Only a numeric tail marks a sustained crossing; anything else is
        // part of the entity name.
        let (rest, sustain_ms) = match rest.rfind(":sustained:") {
            Some(idx) => match rest[idx + ":sustained:".len()..].parse::<u64>() {
                Ok(ms) => (&rest[..idx], Some(ms)),
                Err(_) => (rest, None),
            },
            None => (rest, None),
        };

        // Split from the right so entities may contain ':'
        let mut parts = rest.rsplitn(3, ':');
        let threshold_repr = parts.next()?.to_string();
        let direction = match parts.next()? {
            "above" => Direction::Above,
            "below" => Direction::Below,
            _ => return None,
        };
        let entity = parts.next()?.to_string();
        if entity.is_empty() || threshold_repr.is_empty() {
            return None;
        }

        Some(Self {
            entity,
            direction,
            threshold_repr,
            sustain_ms,
        })
    }

    /// Whether this crossing event corresponds to a concrete trigger
    ///
    /// Rules sharing a `num:` key can carry different thresholds and sustain
    /// durations; only the exact trigger that produced the event matches.
    pub fn matches(&self, trigger: &NumericThresholdTrigger) -> bool {
        trigger.entity == self.entity
            && trigger.direction == self.direction
            && format!("{}", trigger.threshold) == self.threshold_repr
            && trigger.sustain_for.map(|d| d.as_millis() as u64) == self.sustain_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::{EventTrigger, PatternSequenceTrigger, TimeScheduleTrigger};
    use std::time::Duration;

    fn rule_with_triggers(id: &str, triggers: Vec<Trigger>) -> Arc<Rule> {
        Arc::new(Rule {
            id: id.to_string(),
            mode: Default::default(),
            triggers,
            conditions: vec![],
            actions: vec![],
        })
    }

    fn event_trigger(name: &str) -> Trigger {
        Trigger::Event(EventTrigger {
            name: name.to_string(),
        })
    }

    #[test]
    fn test_index_groups_by_event_name() {
        let rules = vec![
            rule_with_triggers("r1", vec![event_trigger("press")]),
            rule_with_triggers("r2", vec![event_trigger("press")]),
            rule_with_triggers("r3", vec![event_trigger("release")]),
        ];

        let index = TriggerIndex::build(&rules);
        let mut hits: Vec<&str> = index
            .candidates("event:press")
            .iter()
            .map(|s| s.as_str())
            .collect();
        hits.sort_unstable();
        assert_eq!(hits, vec!["r1", "r2"]);
        assert_eq!(index.candidates("event:release"), &["r3".to_string()]);
        assert!(index.candidates("event:unknown").is_empty());
    }

    #[test]
    fn test_canonical_keys() {
        assert_eq!(
            canonical_key(&event_trigger("press")),
            Some("event:press".to_string())
        );
        assert_eq!(
            canonical_key(&Trigger::NumericThreshold(NumericThresholdTrigger {
                entity: "temp".to_string(),
                direction: Direction::Below,
                threshold: 5.0,
                sustain_for: None,
            })),
            Some("num:below:temp".to_string())
        );
        assert_eq!(
            canonical_key(&Trigger::TimeSchedule(TimeScheduleTrigger {
                every: Duration::from_secs(60),
            })),
            Some("time:60000".to_string())
        );
        assert_eq!(
            canonical_key(&Trigger::PatternSequence(PatternSequenceTrigger {
                steps: vec!["a".to_string()],
                window: Duration::from_millis(100),
            })),
            None
        );
    }

    #[test]
    fn test_pattern_triggers_excluded_from_index() {
        let rules = vec![rule_with_triggers(
            "r1",
            vec![
                event_trigger("press"),
                Trigger::PatternSequence(PatternSequenceTrigger {
                    steps: vec!["a".to_string(), "b".to_string()],
                    window: Duration::from_millis(100),
                }),
            ],
        )];

        let mut index = TriggerIndex::build(&rules);
        assert_eq!(index.key_count(), 1);
        let watchers = index.take_watchers();
        assert_eq!(watchers.len(), 1);
        assert_eq!(watchers[0].rule_id(), "r1");
    }

    #[test]
    fn test_malformed_trigger_skipped_rule_stays_active() {
        let rules = vec![rule_with_triggers(
            "r1",
            vec![
                event_trigger(""), // malformed: empty name
                event_trigger("press"),
            ],
        )];

        let index = TriggerIndex::build(&rules);
        assert_eq!(index.candidates("event:press"), &["r1".to_string()]);
        assert!(index.candidates("event:").is_empty());
    }

    #[test]
    fn test_event_key_derivation() {
        assert_eq!(event_key("press"), "event:press");
        assert_eq!(event_key("time:60000"), "time:60000");
        assert_eq!(event_key("threshold:temp:above:30"), "num:above:temp");
        assert_eq!(
            event_key("threshold:temp:above:30:sustained:5000"),
            "num:above:temp"
        );
    }

    #[test]
    fn test_threshold_event_parse() {
        let parsed = ThresholdEvent::parse("threshold:temp:above:30").unwrap();
        assert_eq!(parsed.entity, "temp");
        assert_eq!(parsed.direction, Direction::Above);
        assert_eq!(parsed.threshold_repr, "30");
        assert_eq!(parsed.sustain_ms, None);

        let sustained =
            ThresholdEvent::parse("threshold:room:sensor:below:0.5:sustained:2000").unwrap();
        assert_eq!(sustained.entity, "room:sensor");
        assert_eq!(sustained.direction, Direction::Below);
        assert_eq!(sustained.threshold_repr, "0.5");
        assert_eq!(sustained.sustain_ms, Some(2000));

        assert!(ThresholdEvent::parse("press").is_none());
        assert!(ThresholdEvent::parse("threshold:temp:sideways:1").is_none());
        assert!(ThresholdEvent::parse("threshold:temp:above:30:sustained:abc").is_none());
    }

    #[test]
    fn test_threshold_event_matches_concrete_trigger() {
        let parsed = ThresholdEvent::parse("threshold:temp:above:30").unwrap();

        let exact = NumericThresholdTrigger {
            entity: "temp".to_string(),
            direction: Direction::Above,
            threshold: 30.0,
            sustain_for: None,
        };
        assert!(parsed.matches(&exact));

        let other_threshold = NumericThresholdTrigger {
            threshold: 25.0,
            ..exact.clone()
        };
        assert!(!parsed.matches(&other_threshold));

        let sustained = NumericThresholdTrigger {
            sustain_for: Some(Duration::from_secs(1)),
            ..exact
        };
        assert!(!parsed.matches(&sustained));
    }

    #[test]
    fn test_sustained_event_matches_only_its_duration() {
        let event = ThresholdEvent::parse("threshold:temp:above:30:sustained:5000").unwrap();

        let short = NumericThresholdTrigger {
            entity: "temp".to_string(),
            direction: Direction::Above,
            threshold: 30.0,
            sustain_for: Some(Duration::from_secs(5)),
        };
        assert!(event.matches(&short));

        // Same entity, direction and threshold but a longer sustain: the
        // shorter watch firing must not satisfy this trigger.
        let long = NumericThresholdTrigger {
            sustain_for: Some(Duration::from_secs(60)),
            ..short.clone()
        };
        assert!(!event.matches(&long));

        let immediate = NumericThresholdTrigger {
            sustain_for: None,
            ..short
        };
        assert!(!event.matches(&immediate));
    }

    #[test]
    fn test_schedule_intervals() {
        let rules = vec![
            rule_with_triggers(
                "r1",
                vec![Trigger::TimeSchedule(TimeScheduleTrigger {
                    every: Duration::from_secs(1),
                })],
            ),
            rule_with_triggers(
                "r2",
                vec![Trigger::TimeSchedule(TimeScheduleTrigger {
                    every: Duration::from_secs(1),
                })],
            ),
            rule_with_triggers(
                "r3",
                vec![Trigger::TimeSchedule(TimeScheduleTrigger {
                    every: Duration::from_secs(5),
                })],
            ),
        ];

        let index = TriggerIndex::build(&rules);
        assert_eq!(index.schedule_intervals(), vec![1000, 5000]);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let rules = vec![rule_with_triggers(
            "r1",
            vec![
                event_trigger("press"),
                Trigger::PatternSequence(PatternSequenceTrigger {
                    steps: vec!["a".to_string()],
                    window: Duration::from_millis(100),
                }),
            ],
        )];

        let mut first = TriggerIndex::build(&rules);
        let mut second = TriggerIndex::build(&rules);
        assert_eq!(first.key_count(), second.key_count());
        assert_eq!(first.candidates("event:press"), second.candidates("event:press"));
        assert_eq!(first.take_watchers().len(), second.take_watchers().len());
    }
}
