//! Pattern sequence matching
//!
//! One stateful watcher exists per (rule, pattern trigger) pair. Watchers
//! are driven synchronously by the single event-consumption loop, in event
//! arrival order, so no instance ever sees concurrent calls.

use std::time::Duration;
use tracing::trace;

use crate::trigger::PatternSequenceTrigger;

/// Stateful matcher for one pattern sequence trigger
///
/// Tracks how far into the expected step list the event stream has
/// progressed and when the current partial match started. Completions never
/// overlap: a finished sequence must replay from scratch.
#[derive(Debug, Clone)]
pub struct SequenceWatcher {
    /// Rule the watcher reports completions for
    rule_id: String,
    /// Expected event names, in order
    steps: Vec<String>,
    /// Rolling window the sequence must complete inside
    window: Duration,
    /// Next step to match
    index: usize,
    /// When the current partial match started
    window_start: Duration,
}

impl SequenceWatcher {
    /// Create a watcher for a rule's pattern trigger
    pub fn new(rule_id: impl Into<String>, trigger: &PatternSequenceTrigger) -> Self {
        Self {
            rule_id: rule_id.into(),
            steps: trigger.steps.clone(),
            window: trigger.window,
            index: 0,
            window_start: Duration::ZERO,
        }
    }

    /// The rule this watcher belongs to
    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    /// Feed one event; returns true when the sequence completes
    pub fn observe(&mut self, event_name: &str, now: Duration) -> bool {
        // An expired attempt resets first so the same event can still start
        // a fresh one.
        if self.index > 0 && now.saturating_sub(self.window_start) > self.window {
            trace!(rule_id = %self.rule_id, "Pattern window expired");
            self.index = 0;
        }

        if self.index == 0 {
            if event_name == self.steps[0] {
                self.index = 1;
                self.window_start = now;
                return self.check_complete();
            }
            return false;
        }

        if event_name == self.steps[self.index] {
            self.index += 1;
            return self.check_complete();
        }

        // Out-of-sequence event: may itself start a new attempt
        if event_name == self.steps[0] {
            trace!(rule_id = %self.rule_id, event_name, "Pattern restarted mid-sequence");
            self.index = 1;
            self.window_start = now;
            return self.check_complete();
        }

        trace!(rule_id = %self.rule_id, event_name, "Pattern reset on mismatch");
        self.index = 0;
        false
    }

    fn check_complete(&mut self) -> bool {
        if self.index == self.steps.len() {
            trace!(rule_id = %self.rule_id, "Pattern sequence completed");
            self.index = 0;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn watcher(steps: &[&str], window_ms: u64) -> SequenceWatcher {
        SequenceWatcher::new(
            "test_rule",
            &PatternSequenceTrigger {
                steps: steps.iter().map(|s| s.to_string()).collect(),
                window: ms(window_ms),
            },
        )
    }

    #[test]
    fn test_double_event_completes_once() {
        let mut w = watcher(&["a", "a"], 250);
        assert!(!w.observe("a", ms(0)));
        assert!(w.observe("a", ms(100)));
    }

    #[test]
    fn test_completion_requires_full_replay() {
        let mut w = watcher(&["a", "a"], 250);
        assert!(!w.observe("a", ms(0)));
        assert!(w.observe("a", ms(50)));
        // No overlap credit: the third event only starts a new attempt
        assert!(!w.observe("a", ms(100)));
        assert!(w.observe("a", ms(150)));
    }

    #[test]
    fn test_interleaved_event_resets() {
        let mut w = watcher(&["a", "b"], 250);
        assert!(!w.observe("a", ms(0)));
        assert!(!w.observe("c", ms(50)));
        // 'b' alone must not complete after the reset
        assert!(!w.observe("b", ms(100)));
    }

    #[test]
    fn test_mid_sequence_restart_on_first_step() {
        let mut w = watcher(&["a", "b"], 250);
        assert!(!w.observe("a", ms(0)));
        // 'a' again is not 'b', but restarts a fresh attempt
        assert!(!w.observe("a", ms(50)));
        assert!(w.observe("b", ms(100)));
    }

    #[test]
    fn test_window_expiry_boundary() {
        let mut w = watcher(&["a", "b"], 100);
        assert!(!w.observe("a", ms(0)));
        // 101ms elapsed: expired, does not complete
        assert!(!w.observe("b", ms(101)));

        let mut w = watcher(&["a", "b"], 100);
        assert!(!w.observe("a", ms(0)));
        // 99ms elapsed: inside the window
        assert!(w.observe("b", ms(99)));
    }

    #[test]
    fn test_expiry_does_not_swallow_fresh_start() {
        let mut w = watcher(&["a", "b"], 100);
        assert!(!w.observe("a", ms(0)));
        // Window expired, but this 'a' starts a new attempt
        assert!(!w.observe("a", ms(500)));
        assert!(w.observe("b", ms(550)));
    }

    #[test]
    fn test_single_step_sequence() {
        let mut w = watcher(&["a"], 100);
        assert!(w.observe("a", ms(0)));
        // And again, from scratch
        assert!(w.observe("a", ms(10)));
        assert!(!w.observe("b", ms(20)));
    }

    #[test]
    fn test_three_step_sequence() {
        let mut w = watcher(&["a", "b", "c"], 1000);
        assert!(!w.observe("a", ms(0)));
        assert!(!w.observe("b", ms(100)));
        assert!(w.observe("c", ms(200)));
    }
}
