//! Event subscriptions for the live client.
//!
//! Each subscriber owns an unbounded channel, so delivery is lossless and
//! preserves emission order. Receivers that have been dropped are pruned on
//! the next emit.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use super::base::{LiveEvent, LiveEventKind};

/// Handle returned by [`EventRegistry::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    /// Id used to unsubscribe
    pub id: u64,
    /// Ordered event stream
    pub events: mpsc::UnboundedReceiver<LiveEvent>,
}

impl Subscription {
    /// Await the next event; `None` once the registry is gone or the
    /// subscription was removed.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }
}

struct Subscriber {
    id: u64,
    /// `None` means every kind
    kinds: Option<Vec<LiveEventKind>>,
    tx: mpsc::UnboundedSender<LiveEvent>,
}

impl Subscriber {
    fn wants(&self, kind: LiveEventKind) -> bool {
        self.kinds.as_ref().is_none_or(|kinds| kinds.contains(&kind))
    }
}

/// Fan-out of typed events to any number of subscribers.
#[derive(Clone, Default)]
pub struct EventRegistry {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    next_id: Arc<AtomicU64>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event kind.
    pub fn subscribe(&self) -> Subscription {
        self.register(None)
    }

    /// Subscribe to a subset of event kinds.
    pub fn subscribe_to(&self, kinds: &[LiveEventKind]) -> Subscription {
        self.register(Some(kinds.to_vec()))
    }

    fn register(&self, kinds: Option<Vec<LiveEventKind>>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber { id, kinds, tx });
        Subscription { id, events: rx }
    }

    /// Remove a subscription. Returns false if the id is unknown.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Deliver an event to every interested subscriber.
    pub fn emit(&self, event: LiveEvent) {
        let kind = event.kind();
        tracing::debug!(event = %kind, "Emitting live event");

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|subscriber| {
            if !subscriber.wants(kind) {
                return !subscriber.tx.is_closed();
            }
            subscriber.tx.send(event.clone()).is_ok()
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
