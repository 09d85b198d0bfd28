//! Rule run scheduling
//!
//! Owns the per-rule run state and enforces the concurrency mode. A rule's
//! state is created lazily on its first trigger and destroyed once its last
//! running or queued instance completes, so an idle engine carries no run
//! state at all.

use dashmap::DashMap;
use eca_automation::{Rule, RunMode};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::executor::{ActionExecutor, RunOutcome};

/// One live rule execution
struct Instance {
    /// Disambiguates stale completions after a restart
    id: u64,
    cancel: CancellationToken,
}

/// Run state for one rule id
#[derive(Default)]
struct RunState {
    /// The live instance under single/restart/queued modes
    current: Option<Instance>,
    /// Pending invocations under queued mode
    queue: VecDeque<Arc<Rule>>,
    /// Live instances under parallel mode
    parallel: Vec<Instance>,
}

impl RunState {
    fn is_empty(&self) -> bool {
        self.current.is_none() && self.queue.is_empty() && self.parallel.is_empty()
    }
}

/// Schedules rule runs according to their concurrency mode
pub struct RuleScheduler {
    runs: DashMap<String, RunState>,
    executor: Arc<ActionExecutor>,
    /// Backlog bound for queued mode; `None` is unbounded. Overflow drops
    /// the new trigger with a warning.
    queue_limit: Option<usize>,
    next_instance_id: AtomicU64,
}

impl RuleScheduler {
    /// Create a scheduler with the given queued-mode backlog policy
    pub fn new(executor: Arc<ActionExecutor>, queue_limit: Option<usize>) -> Self {
        Self {
            runs: DashMap::new(),
            executor,
            queue_limit,
            next_instance_id: AtomicU64::new(1),
        }
    }

    /// Hand a triggered rule to the state machine
    ///
    /// Conditions have already passed by the time a trigger reaches here.
    pub fn trigger(self: &Arc<Self>, rule: Arc<Rule>) {
        let mut state = self.runs.entry(rule.id.clone()).or_default();
        match rule.mode {
            RunMode::Single => {
                if state.current.is_some() {
                    debug!(rule_id = %rule.id, "Already running, dropping trigger");
                    return;
                }
                state.current = Some(self.launch(rule));
            }
            RunMode::Restart => {
                if let Some(instance) = state.current.take() {
                    debug!(rule_id = %rule.id, "Cancelling running instance for restart");
                    instance.cancel.cancel();
                }
                state.current = Some(self.launch(rule));
            }
            RunMode::Queued => {
                if state.current.is_none() {
                    state.current = Some(self.launch(rule));
                } else if self
                    .queue_limit
                    .is_some_and(|limit| state.queue.len() >= limit)
                {
                    warn!(rule_id = %rule.id, queued = state.queue.len(),
                        "Queue limit reached, dropping trigger");
                } else {
                    debug!(rule_id = %rule.id, "Queueing trigger behind running instance");
                    state.queue.push_back(rule);
                }
            }
            RunMode::Parallel => {
                let instance = self.launch(rule);
                state.parallel.push(instance);
            }
        }
    }

    /// Number of live instances for a rule id
    pub fn active_count(&self, rule_id: &str) -> usize {
        self.runs
            .get(rule_id)
            .map(|s| usize::from(s.current.is_some()) + s.parallel.len())
            .unwrap_or(0)
    }

    /// Number of queued invocations for a rule id
    pub fn queued_count(&self, rule_id: &str) -> usize {
        self.runs.get(rule_id).map(|s| s.queue.len()).unwrap_or(0)
    }

    /// Cancel every live instance and drop all queued invocations
    pub fn shutdown(&self) {
        debug!("Cancelling all rule runs");
        for mut entry in self.runs.iter_mut() {
            if let Some(instance) = &entry.current {
                instance.cancel.cancel();
            }
            for instance in &entry.parallel {
                instance.cancel.cancel();
            }
            entry.queue.clear();
        }
    }

    /// Spawn one rule execution as an independent task
    fn launch(self: &Arc<Self>, rule: Arc<Rule>) -> Instance {
        let id = self.next_instance_id.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        debug!(rule_id = %rule.id, instance = id, "Starting rule run");

        let scheduler = self.clone();
        let executor = self.executor.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            let outcome = executor.run(&rule.actions, &token).await;
            match outcome {
                RunOutcome::Completed => {
                    debug!(rule_id = %rule.id, instance = id, "Rule run completed")
                }
                RunOutcome::Cancelled => {
                    debug!(rule_id = %rule.id, instance = id, "Rule run cancelled")
                }
            }
            scheduler.on_complete(&rule, id);
        });

        Instance { id, cancel }
    }

    /// Bookkeeping after an instance reaches a terminal state
    fn on_complete(self: &Arc<Self>, rule: &Rule, instance_id: u64) {
        if let Some(mut state) = self.runs.get_mut(&rule.id) {
            match rule.mode {
                RunMode::Parallel => {
                    state.parallel.retain(|i| i.id != instance_id);
                }
                _ => {
                    // A stale completion (cancelled by restart) must not
                    // touch the instance that replaced it.
                    if state.current.as_ref().map(|i| i.id) == Some(instance_id) {
                        state.current = None;
                        if let Some(next) = state.queue.pop_front() {
                            debug!(rule_id = %rule.id, "Starting next queued run");
                            state.current = Some(self.launch(next));
                        }
                    }
                }
            }
        }
        // Destroy the run state once nothing is running or pending
        self.runs.remove_if(&rule.id, |_, state| state.is_empty());
    }
}
