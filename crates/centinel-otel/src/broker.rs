//! Event-broker callback interface (spec.md §6).
//!
//! An outbound-only notification interface: every significant engine moment
//! emits a typed [`BrokerEvent`] to every registered [`BrokerListener`] in
//! the same loop thread's sequential order. A listener may cancel the
//! engine's default handling or just observe.
//!
//! The design-notes entry for "thread-unsafe globals mutated from callback
//! context (`neb_*`)" calls for modelling the listener set as an immutable
//! snapshot swapped under a single mutex, read from a single thread. We do
//! that here: registration takes a write lock only to append, dispatch takes
//! a read lock and clones the `Arc` list once per event.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum BrokerEvent {
    ProcessStart,
    ProcessShutdown,
    CheckStart { entity: String },
    CheckEnd { entity: String, exit_code: Option<i32> },
    StateChange { entity: String, from: String, to: String },
    NotificationStart { entity: String, reason: String },
    NotificationEnd { entity: String, contacts_notified: usize },
    CommentAdd { id: u64, entity: String },
    CommentDelete { id: u64 },
    DowntimeAdd { id: u64, entity: String },
    DowntimeDelete { id: u64 },
    FlappingStart { entity: String },
    FlappingStop { entity: String },
    AdaptiveChange { entity: String, field: String },
    ExternalCommandReceived { raw: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackDisposition {
    /// Continue with the engine's default handling.
    Continue,
    /// Abort the engine's default handling for this moment entirely.
    Cancel,
    /// Suppress the engine's default handling but continue normal flow.
    Override,
}

pub trait BrokerListener: Send + Sync {
    fn on_event(&self, at: DateTime<Utc>, event: &BrokerEvent) -> CallbackDisposition;
}

#[derive(Default)]
pub struct Broker {
    listeners: RwLock<Vec<Arc<dyn BrokerListener>>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn BrokerListener>) {
        self.listeners.write().push(listener);
    }

    /// Dispatches `event` to every registered listener in registration
    /// order, returning the strongest disposition observed (`Cancel` beats
    /// `Override` beats `Continue`).
    pub fn dispatch(&self, event: BrokerEvent) -> CallbackDisposition {
        let now = Utc::now();
        let snapshot = self.listeners.read().clone();
        let mut strongest = CallbackDisposition::Continue;
        for listener in snapshot.iter() {
            let disposition = listener.on_event(now, &event);
            strongest = combine(strongest, disposition);
        }
        strongest
    }
}

fn combine(a: CallbackDisposition, b: CallbackDisposition) -> CallbackDisposition {
    use CallbackDisposition::*;
    match (a, b) {
        (Cancel, _) | (_, Cancel) => Cancel,
        (Override, _) | (_, Override) => Override,
        _ => Continue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);
    impl BrokerListener for Counter {
        fn on_event(&self, _at: DateTime<Utc>, _event: &BrokerEvent) -> CallbackDisposition {
            self.0.fetch_add(1, Ordering::SeqCst);
            CallbackDisposition::Continue
        }
    }

    #[test]
    fn dispatches_in_registration_order_to_all_listeners() {
        let broker = Broker::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        broker.register(counter.clone());
        broker.register(counter.clone());
        broker.dispatch(BrokerEvent::ProcessStart);
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    struct Canceler;
    impl BrokerListener for Canceler {
        fn on_event(&self, _at: DateTime<Utc>, _event: &BrokerEvent) -> CallbackDisposition {
            CallbackDisposition::Cancel
        }
    }

    #[test]
    fn cancel_beats_override_and_continue() {
        let broker = Broker::new();
        broker.register(Arc::new(Canceler));
        let disposition = broker.dispatch(BrokerEvent::ProcessStart);
        assert_eq!(disposition, CallbackDisposition::Cancel);
    }
}
