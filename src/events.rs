use std::collections::HashMap;

use rhai::FnPtr;

use crate::component::Component;

/// A `(component, handler)` pair. The handler is resolved by name against
/// the subscribing component's behavior definition at delivery time.
#[derive(Clone)]
pub struct Subscription {
    pub component: Component,
    pub handler: FnPtr,
}

impl Subscription {
    fn matches(&self, other: &Subscription) -> bool {
        self.component.ptr_eq(&other.component)
            && self.handler.fn_name() == other.handler.fn_name()
    }
}

/// Topic-keyed subscriber table. Subscribe and unsubscribe requests queue
/// until the per-frame flush so the live table never changes while a publish
/// is walking it.
#[derive(Default)]
pub struct EventBus {
    live: HashMap<String, Vec<Subscription>>,
    pending_subscribe: Vec<(String, Subscription)>,
    pending_unsubscribe: Vec<(String, Subscription)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_subscribe(&mut self, topic: &str, component: Component, handler: FnPtr) {
        self.pending_subscribe.push((topic.to_string(), Subscription { component, handler }));
    }

    pub fn queue_unsubscribe(&mut self, topic: &str, component: Component, handler: FnPtr) {
        self.pending_unsubscribe.push((topic.to_string(), Subscription { component, handler }));
    }

    /// Snapshot of the live subscribers for a topic, in subscription order.
    /// Publishing iterates the snapshot, so handlers that mutate the table
    /// only affect later frames.
    pub fn subscribers(&self, topic: &str) -> Vec<Subscription> {
        self.live.get(topic).cloned().unwrap_or_default()
    }

    /// Applies the pending tables: duplicates are ignored on subscribe, and
    /// each unsubscribe removes the first matching pair.
    pub fn flush(&mut self) {
        for (topic, subscription) in self.pending_subscribe.drain(..) {
            let list = self.live.entry(topic).or_default();
            if !list.iter().any(|existing| existing.matches(&subscription)) {
                list.push(subscription);
            }
        }
        for (topic, subscription) in self.pending_unsubscribe.drain(..) {
            if let Some(list) = self.live.get_mut(&topic) {
                if let Some(pos) = list.iter().position(|existing| existing.matches(&subscription))
                {
                    list.remove(pos);
                }
                if list.is_empty() {
                    self.live.remove(&topic);
                }
            }
        }
    }

    /// Drops every subscription owned by the given component, live and
    /// pending. Called when the component is physically removed.
    pub fn purge_component(&mut self, component: &Component) {
        for list in self.live.values_mut() {
            list.retain(|s| !s.component.ptr_eq(component));
        }
        self.live.retain(|_, list| !list.is_empty());
        self.pending_subscribe.retain(|(_, s)| !s.component.ptr_eq(component));
        self.pending_unsubscribe.retain(|(_, s)| !s.component.ptr_eq(component));
    }
}
