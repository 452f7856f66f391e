//! In-process publish/subscribe bus used to decouple reply verification from
//! generation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tracing::trace;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventMetadata {
    pub correlation_id: String,
    pub priority: Priority,
}

impl EventMetadata {
    pub fn correlated(correlation_id: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into(), priority: Priority::Normal }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Event {
    pub event_type: String,
    pub payload: Value,
    pub metadata: EventMetadata,
}

pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

type Listeners = HashMap<String, Vec<(SubscriptionId, EventHandler)>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Publish/subscribe seam. Publishing never fails: an event without listeners
/// is dropped.
pub trait EventBus: Send + Sync {
    fn publish(&self, event_type: &str, payload: Value, metadata: EventMetadata);

    fn subscribe(&self, event_type: &str, handler: EventHandler) -> SubscriptionId;

    /// Returns false when the subscription was already removed.
    fn unsubscribe(&self, event_type: &str, id: SubscriptionId) -> bool;

    fn listener_count(&self, event_type: &str) -> usize;
}

/// Bus that invokes handlers synchronously on the publishing task, in
/// subscription order. Handlers may publish or (un)subscribe re-entrantly.
#[derive(Default)]
pub struct InMemoryBus {
    next_id: AtomicU64,
    listeners: Mutex<Listeners>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventBus for InMemoryBus {
    fn publish(&self, event_type: &str, payload: Value, metadata: EventMetadata) {
        let handlers: Vec<EventHandler> = self
            .lock()
            .get(event_type)
            .map(|entries| entries.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default();

        trace!(
            event_name = "agent.bus.publish",
            event_type,
            correlation_id = %metadata.correlation_id,
            listeners = handlers.len(),
            "publishing event"
        );

        let event = Event { event_type: event_type.to_string(), payload, metadata };
        for handler in handlers {
            handler(&event);
        }
    }

    fn subscribe(&self, event_type: &str, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().entry(event_type.to_string()).or_default().push((id, handler));
        id
    }

    fn unsubscribe(&self, event_type: &str, id: SubscriptionId) -> bool {
        let mut listeners = self.lock();
        let Some(entries) = listeners.get_mut(event_type) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(event_type);
        }
        removed
    }

    fn listener_count(&self, event_type: &str) -> usize {
        self.lock().get(event_type).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::{Event, EventBus, EventHandler, EventMetadata, InMemoryBus, Priority};

    #[test]
    fn delivers_to_subscribers_of_the_event_type_only() {
        let bus = InMemoryBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let handler: EventHandler = Arc::new(move |event: &Event| {
            sink.lock().expect("seen lock").push(event.payload["n"].as_i64().unwrap_or_default());
        });
        bus.subscribe("a", handler);

        bus.publish("a", json!({ "n": 1 }), EventMetadata::correlated("c-1"));
        bus.publish("b", json!({ "n": 2 }), EventMetadata::correlated("c-2"));

        assert_eq!(*seen.lock().expect("seen lock"), vec![1]);
    }

    #[test]
    fn unsubscribe_removes_listener_once() {
        let bus = InMemoryBus::new();
        let id = bus.subscribe("a", Arc::new(|_: &Event| {}));
        bus.subscribe("a", Arc::new(|_: &Event| {}));
        assert_eq!(bus.listener_count("a"), 2);

        assert!(bus.unsubscribe("a", id));
        assert!(!bus.unsubscribe("a", id));
        assert_eq!(bus.listener_count("a"), 1);
        assert!(!bus.unsubscribe("missing", id));
    }

    #[test]
    fn handlers_can_publish_reentrantly() {
        let bus = Arc::new(InMemoryBus::new());
        let replies = Arc::new(Mutex::new(Vec::new()));

        let responder = Arc::clone(&bus);
        bus.subscribe(
            "ping",
            Arc::new(move |event: &Event| {
                responder.publish("pong", json!({}), event.metadata.clone());
            }),
        );
        let sink = Arc::clone(&replies);
        bus.subscribe(
            "pong",
            Arc::new(move |event: &Event| {
                sink.lock().expect("reply lock").push(event.metadata.clone());
            }),
        );

        let metadata = EventMetadata::correlated("c-9").with_priority(Priority::High);
        bus.publish("ping", json!({}), metadata.clone());

        assert_eq!(*replies.lock().expect("reply lock"), vec![metadata]);
    }
}
