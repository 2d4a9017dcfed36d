#![forbid(unsafe_code)]

use tokio::sync::broadcast;

use crate::event::{CacheEvent, CreateEvent, DeleteEvent};

/// Narrow capability for receiving structural change notifications.
///
/// The cache consults no return value: hook failures are isolated from the
/// triggering operation. Implementations are invoked on a spawned task, so a
/// slow or panicking hook never blocks or fails a store/fetch/delete.
pub trait Hooks: Send + Sync + 'static {
    fn on_create(&self, event: &CreateEvent);
    fn on_delete(&self, event: &DeleteEvent);
}

/// Broadcast-backed event sink.
///
/// All namespaces in a tree share one bus. `publish()` is a sync call and
/// silently drops events when there are no subscribers; slow subscribers
/// observe `RecvError::Lagged` instead of blocking the cache.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<CacheEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to all subscribers.
    pub fn publish<E: Into<CacheEvent>>(&self, event: E) {
        let _ = self.tx.send(event.into());
    }

    /// Subscribe to all future events. Each subscriber gets an independent
    /// receiver.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.tx.subscribe()
    }
}

impl Hooks for EventBus {
    fn on_create(&self, event: &CreateEvent) {
        self.publish(event.clone());
    }

    fn on_delete(&self, event: &DeleteEvent) {
        self.publish(event.clone());
    }
}
