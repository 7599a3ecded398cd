//! Event emitter: synchronous fan-out of lifecycle events to registered
//! listeners with exception isolation.
//!
//! Listeners are stored as plain closures holding only the event payload
//! they receive at call time, never a back-reference to the emitter or
//! collector; this sidesteps any cyclic-ownership question structurally
//! rather than through a runtime check.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Lifecycle event type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    CollectionStarted,
    AdCollected,
    PageFetched,
    ErrorOccurred,
    RateLimited,
    SessionRefreshed,
    CollectionFinished,
}

/// One immutable lifecycle event: tag, payload, and emission timestamp.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub event_type: EventType,
    pub payload: Value,
    pub emitted_at: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(event_type: EventType, payload: Value) -> Self {
        Self {
            event_type,
            payload,
            emitted_at: Utc::now(),
        }
    }
}

type Listener = Box<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Mapping from event type to an ordered list of listeners.
///
/// Registration, removal, and emission are serialized relative to each
/// other behind a single `RwLock`; emission only needs read access to the
/// listener list, so concurrent emits don't contend.
#[derive(Default)]
pub struct EventEmitter {
    listeners: RwLock<HashMap<EventType, Vec<Listener>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, event_type: EventType, listener: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write().unwrap();
        listeners.entry(event_type).or_default().push(Box::new(listener));
    }

    pub fn clear(&self, event_type: EventType) {
        self.listeners.write().unwrap().remove(&event_type);
    }

    /// Invoke every listener registered for this event's type, in
    /// registration order. A listener that panics is caught and logged at
    /// warning level; subsequent listeners still run.
    pub fn emit(&self, event: LifecycleEvent) {
        let listeners = self.listeners.read().unwrap();
        if let Some(registered) = listeners.get(&event.event_type) {
            for listener in registered {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(&event)));
                if result.is_err() {
                    tracing::warn!(event_type = ?event.event_type, "lifecycle listener panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn listeners_run_in_registration_order() {
        let emitter = EventEmitter::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let o1 = order.clone();
        emitter.on(EventType::AdCollected, move |_| o1.lock().unwrap().push(1));
        let o2 = order.clone();
        emitter.on(EventType::AdCollected, move |_| o2.lock().unwrap().push(2));

        emitter.emit(LifecycleEvent::new(EventType::AdCollected, Value::Null));
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn panicking_listener_does_not_stop_subsequent_listeners() {
        let emitter = EventEmitter::new();
        let ran = Arc::new(AtomicUsize::new(0));

        emitter.on(EventType::ErrorOccurred, |_| panic!("boom"));
        let r = ran.clone();
        emitter.on(EventType::ErrorOccurred, move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(LifecycleEvent::new(EventType::ErrorOccurred, Value::Null));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unrelated_event_types_do_not_cross_fire() {
        let emitter = EventEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        emitter.on(EventType::PageFetched, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        emitter.emit(LifecycleEvent::new(EventType::CollectionStarted, Value::Null));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
