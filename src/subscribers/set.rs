//! # SubscriberSet: non-blocking fan-out over multiple subscribers
//!
//! [`SubscriberSet`] distributes each [`Event`] to every subscriber **without awaiting**
//! their processing.
//!
//! - `emit(&Event)` returns immediately.
//! - Order is FIFO per subscriber; there is no global order across subscribers.
//! - Queue overflow and subscriber panics are published back to the [`Bus`] as
//!   `SubscriberOverflow` / `SubscriberPanicked`.
//!
//! ```text
//!    emit(&Event)
//!        │                        (Arc-clone per subscriber)
//!        ├────────────────► [queue S1] ─► worker S1 ─► on_event()
//!        ├────────────────► [queue S2] ─► worker S2 ─► on_event()
//!        └────────────────► [queue SN] ─► worker SN ─► on_event()
//! ```

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event, EventKind};

use super::Subscribe;

struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out with per-subscriber bounded queues and worker tasks.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker per subscriber.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
            let worker_bus = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = sub.on_event(ev.as_ref());
                    if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        worker_bus.publish(Event::subscriber_panicked(name, panic_message(&*panic)));
                    }
                }
            });

            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }

        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Fans one event out to all subscribers.
    ///
    /// A full or closed queue drops the event for that subscriber. Dropping an overflow
    /// event itself is not reported again.
    pub fn emit(&self, event: &Event) {
        let ev = Arc::new(event.clone());
        for channel in &self.channels {
            let reason = match channel.sender.try_send(Arc::clone(&ev)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if event.kind != EventKind::SubscriberOverflow {
                self.bus
                    .publish(Event::subscriber_overflow(channel.name, reason));
            }
        }
    }

    /// Closes all queues and waits for the workers to drain them.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;

    struct Counter {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl Subscribe for Counter {
        async fn on_event(&self, _event: &Event) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "counter"
        }
    }

    struct Panicky;

    #[async_trait]
    impl Subscribe for Panicky {
        async fn on_event(&self, _event: &Event) {
            panic!("boom");
        }

        fn name(&self) -> &'static str {
            "panicky"
        }
    }

    struct Stuck {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl Subscribe for Stuck {
        async fn on_event(&self, _event: &Event) {
            self.gate.notified().await;
        }

        fn name(&self) -> &'static str {
            "stuck"
        }

        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn delivers_to_every_subscriber_and_isolates_panics() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let counter = Arc::new(Counter {
            seen: AtomicUsize::new(0),
        });
        let set = SubscriberSet::new(vec![counter.clone(), Arc::new(Panicky)], bus.clone());
        assert_eq!(set.len(), 2);

        set.emit(&Event::new(EventKind::LockPromoted));
        set.emit(&Event::new(EventKind::LockReleased));
        set.shutdown().await;

        assert_eq!(counter.seen.load(Ordering::SeqCst), 2);
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::SubscriberPanicked);
        assert_eq!(ev.task.as_deref(), Some("panicky"));
        assert_eq!(ev.reason.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn overflow_is_reported_once_per_dropped_event() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let gate = Arc::new(Notify::new());
        let set = SubscriberSet::new(vec![Arc::new(Stuck { gate: gate.clone() })], bus.clone());

        for _ in 0..4 {
            set.emit(&Event::new(EventKind::RequestQueued));
        }
        set.emit(&Event::subscriber_overflow("stuck", "full"));

        let mut overflows = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::SubscriberOverflow {
                overflows += 1;
            }
        }
        assert!((2..=3).contains(&overflows));

        for _ in 0..8 {
            gate.notify_one();
            tokio::task::yield_now().await;
        }
    }
}
