//! Event Bus for push-channel events.
//!
//! Subscribers register a handler for one event type tag and get back a
//! [`Subscription`]. `publish` delivers synchronously to every current
//! subscriber of that tag, in subscription order. The bus keeps no history:
//! a handler registered after an event was published never sees it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use robodeck_shared::ServerEvent;

use crate::infrastructure::lock;

use super::Subscription;

pub type EventHandler = Arc<dyn Fn(&ServerEvent) + Send + Sync + 'static>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<String, Vec<(u64, EventHandler)>>,
}

/// Typed publish/subscribe registry keyed by event type.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    /// Create a new EventBus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to events tagged `event_type`.
    pub fn subscribe<F>(&self, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry
                .handlers
                .entry(event_type.to_string())
                .or_default()
                .push((id, Arc::new(handler)));
            id
        };

        let registry = Arc::downgrade(&self.registry);
        let event_type = event_type.to_string();
        Subscription::new(move || {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let mut registry = lock(&registry);
            if let Some(handlers) = registry.handlers.get_mut(&event_type) {
                handlers.retain(|(handler_id, _)| *handler_id != id);
                if handlers.is_empty() {
                    registry.handlers.remove(&event_type);
                }
            }
        })
    }

    /// Subscribe one handler to several event types at once.
    pub fn subscribe_many<F>(&self, event_types: &[&str], handler: F) -> Vec<Subscription>
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        event_types
            .iter()
            .map(|event_type| {
                let handler = Arc::clone(&handler);
                self.subscribe(event_type, move |event| handler(event))
            })
            .collect()
    }

    /// Deliver `event` to the subscribers of its type. Returns how many
    /// handlers ran.
    ///
    /// Handlers run outside the registry lock, so a handler may subscribe or
    /// dispose (itself included) while being called.
    pub fn publish(&self, event: &ServerEvent) -> usize {
        let handlers: Vec<EventHandler> = lock(&self.registry)
            .handlers
            .get(&event.event_type)
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Number of subscribers for one event type.
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        lock(&self.registry)
            .handlers
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Number of subscribers across all event types.
    pub fn total_subscribers(&self) -> usize {
        lock(&self.registry).handlers.values().map(Vec::len).sum()
    }

    /// Clear all subscribers.
    pub fn clear(&self) {
        lock(&self.registry).handlers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn estop(active: bool) -> ServerEvent {
        ServerEvent::new("emergency_stop", json!({ "active": active }))
    }

    #[test]
    fn test_subscribe_and_publish() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));

        let count_clone = Arc::clone(&count);
        let _sub = bus.subscribe("emergency_stop", move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.subscriber_count("emergency_stop"), 1);

        assert_eq!(bus.publish(&estop(true)), 1);
        assert_eq!(bus.publish(&estop(false)), 1);
        assert_eq!(bus.publish(&ServerEvent::new("robot_connected", json!({}))), 0);

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_delivery_follows_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut subs = Vec::new();
        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            subs.push(bus.subscribe("match_start", move |_| {
                order.lock().unwrap().push(name);
            }));
        }

        bus.publish(&ServerEvent::new("match_start", json!({})));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_dispose_removes_only_that_handler() {
        let bus = EventBus::new();
        let count1 = Arc::new(AtomicU32::new(0));
        let count2 = Arc::new(AtomicU32::new(0));

        let count1_clone = Arc::clone(&count1);
        let sub1 = bus.subscribe("emergency_stop", move |_| {
            count1_clone.fetch_add(1, Ordering::SeqCst);
        });
        let count2_clone = Arc::clone(&count2);
        let _sub2 = bus.subscribe("emergency_stop", move |_| {
            count2_clone.fetch_add(1, Ordering::SeqCst);
        });

        sub1.dispose();
        sub1.dispose();
        bus.publish(&estop(true));

        assert_eq!(count1.load(Ordering::SeqCst), 0);
        assert_eq!(count2.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count("emergency_stop"), 1);
    }

    #[test]
    fn test_late_subscriber_sees_no_history() {
        let bus = EventBus::new();
        bus.publish(&estop(true));

        let count = Arc::new(AtomicU32::new(0));
        let count_clone = Arc::clone(&count);
        let _sub = bus.subscribe("emergency_stop", move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_can_dispose_itself_during_publish() {
        let bus = EventBus::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let count = Arc::new(AtomicU32::new(0));

        let slot_clone = Arc::clone(&slot);
        let count_clone = Arc::clone(&count);
        let sub = bus.subscribe("robot_connected", move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = slot_clone.lock().unwrap().as_ref() {
                sub.dispose();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        let event = ServerEvent::new("robot_connected", json!({ "id": "r1" }));
        bus.publish(&event);
        bus.publish(&event);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count("robot_connected"), 0);
    }

    #[test]
    fn test_subscribe_many_and_clear() {
        let bus = EventBus::new();
        let subs = bus.subscribe_many(&["match_start", "match_stop"], |_| {});
        assert_eq!(subs.len(), 2);
        assert_eq!(bus.total_subscribers(), 2);

        bus.clear();
        assert_eq!(bus.total_subscribers(), 0);
    }
}
