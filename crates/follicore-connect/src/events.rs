//! Lifecycle event fan-out
//!
//! Every subscriber owns an unbounded queue, so a slow reader never blocks a
//! state transition and events arrive in the order they were emitted.
//! Dropping an [`EventSubscription`] (or calling
//! [`EventSubscription::unsubscribe`]) detaches it; detaching twice, or after
//! the client is gone, is a no-op.

use crate::error::ClientError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Lifecycle notifications emitted by the connection manager
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    Reconnecting,
    Ready,
    /// Connect or reconnection gave up; carries the final cause
    Error(ClientError),
}

impl ConnectionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionEvent::Connected => "connected",
            ConnectionEvent::Disconnected => "disconnected",
            ConnectionEvent::Reconnecting => "reconnecting",
            ConnectionEvent::Ready => "ready",
            ConnectionEvent::Error(_) => "error",
        }
    }
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionEvent::Error(cause) => write!(f, "error({})", cause),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Default)]
pub(crate) struct EventBus {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, UnboundedSender<ConnectionEvent>)>>,
}

impl EventBus {
    pub(crate) fn subscribe(self: &Arc<Self>) -> EventSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push((id, tx));
        }
        EventSubscription {
            id,
            rx,
            bus: Arc::downgrade(self),
        }
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            // Receivers dropped without unsubscribing are pruned here
            subscribers.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        }
    }

    fn remove(&self, id: u64) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|(sub_id, _)| *sub_id != id);
        }
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

/// Handle to an ordered stream of [`ConnectionEvent`]s
pub struct EventSubscription {
    id: u64,
    rx: UnboundedReceiver<ConnectionEvent>,
    bus: Weak<EventBus>,
}

impl EventSubscription {
    /// Wait for the next event. Returns `None` once the client is dropped
    /// and every queued event has been read.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.rx.recv().await
    }

    /// Next queued event, if one is already available
    pub fn try_recv(&mut self) -> Option<ConnectionEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain every queued event
    pub fn drain(&mut self) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Stop receiving events
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("id", &self.id)
            .finish()
    }
}
