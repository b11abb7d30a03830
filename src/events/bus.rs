//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`]: publishing never blocks, receivers that fall
//! behind observe `RecvError::Lagged(n)` and skip the `n` oldest events, and events sent
//! while nobody listens are dropped.
//!
//! ```text
//! Publishers (many):                  Subscribers:
//!   FleetConnector ──┐
//!   Arbiter ─────────┼──────► Bus ───────► Site listener ────► SubscriberSet
//!   Tickers ─────────┘  (broadcast chan)   tests (bus.subscribe())
//! ```

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers (fire-and-forget).
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Bus::new(1024)
    }
}
