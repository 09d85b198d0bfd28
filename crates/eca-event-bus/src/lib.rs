//! Event bus with broadcast pub/sub for the ECA engine
//!
//! This crate provides the EventBus, the sole channel through which rule
//! triggers are discovered. It is an explicitly constructed, injected
//! instance (one logical bus per engine), not a global singleton, and it
//! supports `reset()` for test isolation: queued, undelivered events are
//! discarded while live subscriptions keep working.

use eca_core::{Event, EventName, SharedClock, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Default channel capacity for event subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Events travel with the bus generation they were published under, so a
/// `reset()` invalidates everything already in flight.
type Envelope = (u64, Event);

/// The event bus for publishing and subscribing to events
///
/// Supports:
/// - Subscribing to a specific event name
/// - Subscribing to all events (the engine's consumption loop does this)
/// - Broadcast delivery: every subscriber observes every published event,
///   in publish order
/// - `reset()` between test cases
pub struct EventBus {
    inner: RwLock<BusInner>,
    /// Clock used to stamp event timestamps at publish time
    clock: SharedClock,
    /// Channel capacity
    capacity: usize,
}

struct BusInner {
    /// Bumped on every reset; in-flight envelopes from older generations
    /// are dropped on receipt
    generation: u64,
    /// Senders per event name, persistent across resets
    listeners: HashMap<EventName, broadcast::Sender<Envelope>>,
    /// Sender for subscribe-all subscribers
    match_all: broadcast::Sender<Envelope>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new(clock: SharedClock) -> Self {
        Self::with_capacity(clock, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the given channel capacity
    pub fn with_capacity(clock: SharedClock, capacity: usize) -> Self {
        let (match_all, _) = broadcast::channel(capacity);
        Self {
            inner: RwLock::new(BusInner {
                generation: 0,
                listeners: HashMap::new(),
                match_all,
            }),
            clock,
            capacity,
        }
    }

    /// Publish an event to all subscribers
    ///
    /// Non-blocking and never fails observably: send errors only mean there
    /// are no active receivers, and a subscriber that falls behind the
    /// channel capacity loses the oldest events (logged on its side).
    pub fn publish(&self, name: impl Into<EventName>, payload: HashMap<String, Value>) {
        let event = Event::new(name, self.clock.now(), payload);
        debug!(name = %event.name, "Publishing event");

        let inner = self.read();
        if let Some(sender) = inner.listeners.get(&event.name) {
            let _ = sender.send((inner.generation, event.clone()));
        }
        let _ = inner.match_all.send((inner.generation, event));
    }

    /// Subscribe to events with a specific name
    pub fn subscribe(self: &Arc<Self>, name: impl Into<EventName>) -> Subscription {
        let name = name.into();
        trace!(name = %name, "Subscribing to event name");
        let mut inner = self.write();
        let capacity = self.capacity;
        let rx = inner
            .listeners
            .entry(name)
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(capacity);
                tx
            })
            .subscribe();
        drop(inner);
        Subscription {
            bus: self.clone(),
            rx,
        }
    }

    /// Subscribe to all events
    pub fn subscribe_all(self: &Arc<Self>) -> Subscription {
        let rx = self.read().match_all.subscribe();
        Subscription {
            bus: self.clone(),
            rx,
        }
    }

    /// Discard all queued, undelivered events
    ///
    /// Live subscriptions stay attached and observe only events published
    /// after the reset. Used between test cases for isolation.
    pub fn reset(&self) {
        let mut inner = self.write();
        inner.generation += 1;
        debug!(generation = inner.generation, "Event bus reset");
    }

    /// Number of event names with at least one subscription channel
    pub fn listener_count(&self) -> usize {
        self.read().listeners.len()
    }

    fn generation(&self) -> u64 {
        self.read().generation
    }

    // Lock poisoning requires a panic while holding the guard; treat it as
    // unrecoverable in this one place.
    fn read(&self) -> RwLockReadGuard<'_, BusInner> {
        self.inner.read().expect("event bus lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, BusInner> {
        self.inner.write().expect("event bus lock poisoned")
    }
}

/// Shared event bus handle
pub type SharedEventBus = Arc<EventBus>;

/// A live subscription to the bus
///
/// Survives `EventBus::reset()`: envelopes published before the reset are
/// silently dropped on receipt, so only post-reset events come out.
pub struct Subscription {
    bus: Arc<EventBus>,
    rx: broadcast::Receiver<Envelope>,
}

impl Subscription {
    /// Receive the next event
    ///
    /// Returns `None` only if the underlying channel closed, which does not
    /// happen while the bus is alive.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok((generation, event)) => {
                    if generation == self.bus.generation() {
                        return Some(event);
                    }
                    trace!(name = %event.name, "Dropping pre-reset event");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscription lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive without waiting; `None` if no event is queued
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok((generation, event)) => {
                    if generation == self.bus.generation() {
                        return Some(event);
                    }
                    trace!(name = %event.name, "Dropping pre-reset event");
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscription lagged, events dropped");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eca_core::SystemClock;
    use std::time::Duration;

    fn make_bus() -> SharedEventBus {
        Arc::new(EventBus::new(Arc::new(SystemClock::new())))
    }

    fn payload(key: &str, value: f64) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert(key.to_string(), Value::Number(value));
        map
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let bus = make_bus();
        let mut sub = bus.subscribe("test_event");

        bus.publish("test_event", payload("n", 1.0));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.name.as_str(), "test_event");
        assert_eq!(event.payload["n"], Value::Number(1.0));
    }

    #[tokio::test]
    async fn test_subscribe_all_preserves_order() {
        let bus = make_bus();
        let mut sub = bus.subscribe_all();

        bus.publish("event_a", HashMap::new());
        bus.publish("event_b", HashMap::new());
        bus.publish("event_c", HashMap::new());

        assert_eq!(sub.recv().await.unwrap().name.as_str(), "event_a");
        assert_eq!(sub.recv().await.unwrap().name.as_str(), "event_b");
        assert_eq!(sub.recv().await.unwrap().name.as_str(), "event_c");
    }

    #[tokio::test]
    async fn test_broadcast_to_multiple_subscribers() {
        let bus = make_bus();
        let mut sub1 = bus.subscribe("shared");
        let mut sub2 = bus.subscribe("shared");

        bus.publish("shared", payload("n", 7.0));

        assert_eq!(sub1.recv().await.unwrap().payload["n"], Value::Number(7.0));
        assert_eq!(sub2.recv().await.unwrap().payload["n"], Value::Number(7.0));
    }

    #[tokio::test]
    async fn test_no_cross_event_pollution() {
        let bus = make_bus();
        let mut sub_a = bus.subscribe("event_a");
        let mut sub_b = bus.subscribe("event_b");

        bus.publish("event_a", HashMap::new());

        assert!(sub_a.recv().await.is_some());
        assert!(sub_b.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_reset_drops_undelivered_events() {
        let bus = make_bus();
        let mut sub = bus.subscribe_all();

        bus.publish("before_reset", HashMap::new());
        bus.reset();
        bus.publish("after_reset", HashMap::new());

        let event = sub.recv().await.unwrap();
        assert_eq!(event.name.as_str(), "after_reset");
    }

    #[tokio::test]
    async fn test_named_subscription_survives_reset() {
        let bus = make_bus();
        let mut sub = bus.subscribe("ping");

        bus.publish("ping", HashMap::new());
        bus.reset();
        bus.publish("ping", HashMap::new());

        // The pre-reset ping is discarded, the post-reset one delivered
        assert!(sub.recv().await.is_some());
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_stamped_from_clock() {
        let clock = Arc::new(SystemClock::new());
        let bus = Arc::new(EventBus::new(clock.clone()));
        let mut sub = bus.subscribe_all();

        tokio::time::sleep(Duration::from_millis(120)).await;
        bus.publish("tick", HashMap::new());

        let event = sub.recv().await.unwrap();
        assert_eq!(event.timestamp, Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = make_bus();
        // Must not block or fail
        bus.publish("nobody_listening", HashMap::new());
    }
}
