//! In-process fan-out of freshly written entries
//!
//! Subscribers register a filter and receive matching entries over an
//! unbounded channel. Delivery is best-effort: a subscriber that went away
//! is dropped from the registry on the next publish.

use super::entry::{LogEntry, Severity, Source};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Per-subscriber filter. An empty set on a dimension means no filtering on
/// that dimension.
#[derive(Debug, Clone, Default)]
pub struct StreamFilter {
    pub levels: Vec<Severity>,
    pub sources: Vec<Source>,
}

impl StreamFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        (self.levels.is_empty() || self.levels.contains(&entry.level))
            && (self.sources.is_empty() || self.sources.contains(&entry.source))
    }
}

struct Subscriber {
    filter: StreamFilter,
    sender: mpsc::UnboundedSender<LogEntry>,
}

/// Fan-out hub. Cheap to share; handlers hold it behind an `Arc`.
pub struct LogBroadcaster {
    // shared with every Subscription so its Drop can deregister
    subscribers: Arc<DashMap<Uuid, Subscriber>>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
        }
    }

    /// Register a subscriber. The returned handle unsubscribes on drop.
    pub fn subscribe(&self, filter: StreamFilter) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.subscribers.insert(id, Subscriber { filter, sender });
        Subscription {
            id,
            receiver,
            registry: Arc::clone(&self.subscribers),
        }
    }

    /// Remove a subscriber. Idempotent.
    pub fn unsubscribe(&self, id: Uuid) {
        self.subscribers.remove(&id);
    }

    /// Deliver an entry to every subscriber whose filter matches. Subscribers
    /// whose channel is closed are pruned.
    pub fn publish(&self, entry: &LogEntry) {
        let mut dead = Vec::new();
        for sub in self.subscribers.iter() {
            if sub.filter.matches(entry) && sub.sender.send(entry.clone()).is_err() {
                dead.push(*sub.key());
            }
        }
        for id in dead {
            self.subscribers.remove(&id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a subscription. Dropping it deregisters the subscriber.
pub struct Subscription {
    id: Uuid,
    receiver: mpsc::UnboundedReceiver<LogEntry>,
    registry: Arc<DashMap<Uuid, Subscriber>>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next matching entry, or `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<LogEntry> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<LogEntry, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}
