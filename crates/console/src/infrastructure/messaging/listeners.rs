//! Snapshot listener registry shared by the log aggregator and entity store.

use std::sync::{Arc, Mutex, Weak};

use crate::infrastructure::lock;
use super::Subscription;

pub type Listener<T> = Arc<dyn Fn(T) + Send + Sync + 'static>;

struct ListenerSet<T> {
    next_id: u64,
    entries: Vec<(u64, Listener<T>)>,
}

/// Ordered set of listeners that each receive a clone of every notified value.
pub struct Listeners<T> {
    inner: Arc<Mutex<ListenerSet<T>>>,
}

impl<T> Clone for Listeners<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Listeners<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ListenerSet {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub fn add(&self, listener: Listener<T>) -> Subscription {
        let id = {
            let mut set = lock(&self.inner);
            let id = set.next_id;
            set.next_id += 1;
            set.entries.push((id, listener));
            id
        };

        let weak: Weak<Mutex<ListenerSet<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Deliver `value` to every listener, in registration order. Listeners are
    /// called outside the registry lock, so they may add or dispose listeners.
    pub fn notify(&self, value: T) {
        let listeners: Vec<Listener<T>> = lock(&self.inner)
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(value.clone());
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.inner).entries.clear();
    }
}

impl<T: Clone + Send + 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}
