//! Engine composition root
//!
//! Wires the bus, store, scheduler and executor together and owns the single
//! event-consumption loop. Rule sets are hot-swapped wholesale: `replace_all`
//! builds a fresh snapshot (index, watchers, tickers) and swaps it in behind
//! an `Arc`, so the event loop always observes a consistent rule set.

use eca_automation::{
    eval, event_key, Rule, RuleError, SequenceWatcher, ThresholdEvent, Trigger, TriggerIndex,
};
use eca_core::{Event, SharedClock};
use eca_entity_store::{EntityStore, ThresholdWatch};
use eca_event_bus::SharedEventBus;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::executor::ActionExecutor;
use crate::scheduler::RuleScheduler;
use crate::service::SharedService;

/// One installed rule set snapshot
struct Loaded {
    /// Rules by id
    rules: HashMap<String, Arc<Rule>>,
    /// Canonical-key lookup
    index: TriggerIndex,
    /// Pattern sequence state, driven only by the event loop
    watchers: Mutex<Vec<SequenceWatcher>>,
    /// Cancels this snapshot's schedule ticker tasks
    tickers: CancellationToken,
}

impl Loaded {
    fn empty() -> Self {
        Self {
            rules: HashMap::new(),
            index: TriggerIndex::build(&[]),
            watchers: Mutex::new(Vec::new()),
            tickers: CancellationToken::new(),
        }
    }
}

/// The automation engine
///
/// Explicitly constructed with its collaborators injected; nothing global.
/// `replace_all` installs rules, `start` spawns the event loop, `shutdown`
/// stops everything including in-flight rule runs.
pub struct Engine {
    bus: SharedEventBus,
    store: Arc<EntityStore>,
    scheduler: Arc<RuleScheduler>,
    clock: SharedClock,
    loaded: RwLock<Arc<Loaded>>,
    shutdown: CancellationToken,
}

impl Engine {
    /// Create an engine over the given collaborators
    ///
    /// `queue_limit` bounds the queued-mode backlog per rule; `None` is
    /// unbounded.
    pub fn new(
        bus: SharedEventBus,
        store: Arc<EntityStore>,
        service: SharedService,
        clock: SharedClock,
        queue_limit: Option<usize>,
    ) -> Arc<Self> {
        let executor = Arc::new(ActionExecutor::new(service, clock.clone()));
        let scheduler = Arc::new(RuleScheduler::new(executor, queue_limit));
        Arc::new(Self {
            bus,
            store,
            scheduler,
            clock,
            loaded: RwLock::new(Arc::new(Loaded::empty())),
            shutdown: CancellationToken::new(),
        })
    }

    /// The bus this engine consumes from
    pub fn bus(&self) -> &SharedEventBus {
        &self.bus
    }

    /// The entity store this engine evaluates conditions against
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// The scheduler tracking live rule runs
    pub fn scheduler(&self) -> &Arc<RuleScheduler> {
        &self.scheduler
    }

    /// Replace the entire installed rule set
    ///
    /// Rules with empty or duplicate ids are rejected with a warning; the
    /// remainder loads. Safe to call repeatedly with the same set: the index,
    /// watchers and tickers are rebuilt from scratch each time.
    pub fn replace_all(self: &Arc<Self>, rules: Vec<Rule>) {
        let mut by_id: HashMap<String, Arc<Rule>> = HashMap::new();
        let mut accepted: Vec<Arc<Rule>> = Vec::new();
        for rule in rules {
            if let Err(err) = rule.validate() {
                warn!(rule_id = %rule.id, %err, "Rejecting rule");
                continue;
            }
            if by_id.contains_key(&rule.id) {
                let err = RuleError::DuplicateId(rule.id.clone());
                warn!(rule_id = %rule.id, %err, "Rejecting rule");
                continue;
            }
            let rule = Arc::new(rule);
            by_id.insert(rule.id.clone(), rule.clone());
            accepted.push(rule);
        }

        let mut index = TriggerIndex::build(&accepted);
        let watchers = index.take_watchers();
        self.store.set_threshold_watches(collect_watches(&accepted));

        let tickers = self.shutdown.child_token();
        for interval_ms in index.schedule_intervals() {
            self.spawn_ticker(interval_ms, tickers.clone());
        }

        let loaded = Arc::new(Loaded {
            rules: by_id,
            index,
            watchers: Mutex::new(watchers),
            tickers,
        });
        let previous = self.install(loaded);
        previous.tickers.cancel();
        info!(rules = accepted.len(), "Rule set installed");
    }

    /// Swap in a new snapshot, returning the old one
    ///
    /// The only place the snapshot lock is taken for writing.
    fn install(&self, loaded: Arc<Loaded>) -> Arc<Loaded> {
        let mut slot = self.loaded.write().expect("rule set lock poisoned");
        std::mem::replace(&mut *slot, loaded)
    }

    /// The current snapshot; no lock held after this returns
    fn snapshot(&self) -> Arc<Loaded> {
        self.loaded.read().expect("rule set lock poisoned").clone()
    }

    /// Spawn the event-consumption loop
    ///
    /// A single task drives all trigger matching so pattern watchers observe
    /// events strictly in arrival order. The loop only suspends while awaiting
    /// the next event and stops on `shutdown`.
    pub fn start(self: &Arc<Self>) {
        let engine = self.clone();
        let mut events = self.bus.subscribe_all();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            debug!("Event loop started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => engine.handle_event(&event),
                        None => break,
                    },
                }
            }
            debug!("Event loop stopped");
        });
    }

    /// Stop the event loop, the schedule tickers and all in-flight rule runs
    pub fn shutdown(&self) {
        info!("Shutting down engine");
        self.shutdown.cancel();
        self.scheduler.shutdown();
    }

    /// Match one event against the loaded rule set
    fn handle_event(&self, event: &Event) {
        let loaded = self.snapshot();
        let name = event.name.as_str();
        let key = event_key(name);
        trace!(%name, %key, "Handling event");

        // Threshold events carry the concrete crossing; rules sharing the
        // `num:` key still need their exact trigger to match.
        let crossing = ThresholdEvent::parse(name);
        let mut matched: Vec<Arc<Rule>> = Vec::new();
        for rule_id in loaded.index.candidates(&key) {
            let Some(rule) = loaded.rules.get(rule_id) else {
                continue;
            };
            if let Some(crossing) = &crossing {
                let concrete = rule.triggers.iter().any(|t| {
                    matches!(t, Trigger::NumericThreshold(nt) if crossing.matches(nt))
                });
                if !concrete {
                    continue;
                }
            }
            push_unique(&mut matched, rule.clone());
        }

        {
            let mut watchers = loaded.watchers.lock().expect("watcher lock poisoned");
            for watcher in watchers.iter_mut() {
                if watcher.observe(name, event.timestamp) {
                    if let Some(rule) = loaded.rules.get(watcher.rule_id()) {
                        push_unique(&mut matched, rule.clone());
                    }
                }
            }
        }

        for rule in matched {
            if !eval::evaluate_all(&rule.conditions, &self.store) {
                trace!(rule_id = %rule.id, "Conditions not met");
                continue;
            }
            debug!(rule_id = %rule.id, event = %name, "Rule triggered");
            self.scheduler.trigger(rule);
        }
    }

    /// Spawn one schedule ticker publishing `time:{ms}` events
    fn spawn_ticker(&self, interval_ms: u64, cancel: CancellationToken) {
        let bus = self.bus.clone();
        let clock = self.clock.clone();
        let interval = Duration::from_millis(interval_ms);
        tokio::spawn(async move {
            debug!(interval_ms, "Schedule ticker started");
            loop {
                tokio::select! {
                    _ = clock.sleep(interval) => {
                        bus.publish(format!("time:{}", interval_ms), HashMap::new());
                    }
                    _ = cancel.cancelled() => break,
                }
            }
            debug!(interval_ms, "Schedule ticker stopped");
        });
    }
}

/// Threshold watches for every valid numeric-threshold trigger in a rule set
fn collect_watches(rules: &[Arc<Rule>]) -> Vec<ThresholdWatch> {
    let mut watches = Vec::new();
    for rule in rules {
        for trigger in &rule.triggers {
            if let Trigger::NumericThreshold(t) = trigger {
                if trigger.validate().is_err() {
                    continue;
                }
                let watch = ThresholdWatch {
                    entity: t.entity.clone(),
                    direction: t.direction,
                    threshold: t.threshold,
                    sustain_for: t.sustain_for,
                };
                if !watches.contains(&watch) {
                    watches.push(watch);
                }
            }
        }
    }
    watches
}

fn push_unique(matched: &mut Vec<Arc<Rule>>, rule: Arc<Rule>) {
    if !matched.iter().any(|r| r.id == rule.id) {
        matched.push(rule);
    }
}
