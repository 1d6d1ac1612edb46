/// Explicit publish/subscribe registry for driver notifications
///
/// Listeners are either callbacks or flume channels. Publishing clones the listener list
/// first, so a callback may subscribe or unsubscribe without deadlocking the bus.
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use strum::{Display, EnumString};

use super::registers::Quality;

/// An item changed value or quality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemEvent {
    pub name: String,
    pub value: u16,
    pub quality: Quality,
    pub timestamp: DateTime<Utc>,
}

impl ItemEvent {
    pub fn new(name: impl Into<String>, value: u16, quality: Quality) -> Self {
        Self {
            name: name.into(),
            value,
            quality,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum EventKind {
    ItemValue,
    TransportError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    ItemValue(ItemEvent),
    TransportError { message: String },
}

impl Notification {
    pub fn kind(&self) -> EventKind {
        match self {
            Notification::ItemValue(_) => EventKind::ItemValue,
            Notification::TransportError { .. } => EventKind::TransportError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type Listener = Arc<dyn Fn(&Notification) + Send + Sync>;

#[derive(Clone)]
enum Sink {
    Callback(Listener),
    Channel(flume::Sender<Notification>),
}

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    sink: Sink,
}

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: EventKind, listener: Listener) -> SubscriptionId {
        self.add(kind, Sink::Callback(listener))
    }

    /// Subscribe through an unbounded channel. Dropping the receiver ends the subscription.
    pub fn subscribe_channel(
        &self,
        kind: EventKind,
    ) -> (SubscriptionId, flume::Receiver<Notification>) {
        let (tx, rx) = flume::unbounded();
        (self.add(kind, Sink::Channel(tx)), rx)
    }

    /// Returns false when `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write();
        let before = subs.len();
        subs.retain(|sub| sub.id != id);
        subs.len() != before
    }

    pub fn publish(&self, notification: &Notification) {
        let kind = notification.kind();
        let sinks: Vec<(SubscriptionId, Sink)> = self
            .subscriptions
            .read()
            .iter()
            .filter(|sub| sub.kind == kind)
            .map(|sub| (sub.id, sub.sink.clone()))
            .collect();

        let mut closed = Vec::new();
        for (id, sink) in sinks {
            match sink {
                Sink::Callback(cb) => cb(notification),
                Sink::Channel(tx) => {
                    if tx.send(notification.clone()).is_err() {
                        closed.push(id);
                    }
                }
            }
        }
        if !closed.is_empty() {
            self.subscriptions
                .write()
                .retain(|sub| !closed.contains(&sub.id));
        }
    }

    pub fn publish_items(&self, events: Vec<ItemEvent>) {
        for event in events {
            self.publish(&Notification::ItemValue(event));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    fn add(&self, kind: EventKind, sink: Sink) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .push(Subscription { id, kind, sink });
        id
    }
}
