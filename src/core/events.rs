//! Typed client events and the observer registry that dispatches them.
//!
//! Each client owns one [`EventBus`]. The poller posts `Ready`/`Update`, the
//! metrics reporter posts `Sent`/`Error`, and the client posts `Impression`.
//! Callbacks run synchronously on the task that emits the event, after the
//! state change the event announces is visible.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::UnleashError;
use crate::types::{Context, Variant};

/// Emitted when a toggle marked with `impressionData` is evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpressionEvent {
    pub toggle_name: String,
    pub enabled: bool,
    /// Set for `get_variant` evaluations only.
    pub variant: Option<Variant>,
    pub context: Context,
}

#[derive(Debug, Clone)]
pub enum UnleashEvent {
    /// First successful toggle fetch.
    Ready,
    /// A later successful fetch replaced the toggles.
    Update,
    /// A metrics bucket was delivered.
    Sent,
    /// A metrics bucket could not be delivered.
    Error(Arc<UnleashError>),
    Impression(ImpressionEvent),
}

impl UnleashEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            UnleashEvent::Ready => EventKind::Ready,
            UnleashEvent::Update => EventKind::Update,
            UnleashEvent::Sent => EventKind::Sent,
            UnleashEvent::Error(_) => EventKind::Error,
            UnleashEvent::Impression(_) => EventKind::Impression,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    Update,
    Sent,
    Error,
    Impression,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Ready => "ready",
            EventKind::Update => "update",
            EventKind::Sent => "sent",
            EventKind::Error => "error",
            EventKind::Impression => "impression",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub type EventCallback = Arc<dyn Fn(&UnleashEvent) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<EventKind, Vec<(SubscriptionId, EventCallback)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&UnleashEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let mut removed = false;
        for callbacks in subscribers.values_mut() {
            let before = callbacks.len();
            callbacks.retain(|(existing, _)| *existing != id);
            removed |= callbacks.len() != before;
        }
        removed
    }

    pub fn unsubscribe_all(&self, kind: EventKind) {
        self.subscribers.write().remove(&kind);
    }

    pub fn clear(&self) {
        self.subscribers.write().clear();
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .read()
            .get(&kind)
            .map(|callbacks| callbacks.len())
            .unwrap_or(0)
    }

    pub fn emit(&self, event: UnleashEvent) {
        // Snapshot so callbacks may subscribe or unsubscribe without deadlocking.
        let callbacks: Vec<EventCallback> = self
            .subscribers
            .read()
            .get(&event.kind())
            .map(|callbacks| callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        tracing::debug!(event = %event.kind(), subscribers = callbacks.len(), "Emitting event");

        for callback in callbacks {
            callback(&event);
        }
    }
}
