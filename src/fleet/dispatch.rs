//! # Typed handler registry for fleet events.
//!
//! Maps a [`FleetEventKind`] to an ordered list of async handlers. [`Dispatcher::emit`]
//! awaits each handler in registration order on the caller's task, so a slow handler
//! delays the adapter tick that emitted the event and nothing else.
//!
//! ```text
//! emit(Request) ──► handler #1 ──► handler #2 ──► ... (sequential)
//!                        ├─ Err(_)  → not delivered, next handler still runs
//!                        └─ panic caught → HandlerPanicked, not delivered
//! ```
//!
//! `emit` reports whether the event was delivered: at least one handler ran and none
//! failed. Adapters keep undelivered observations and emit them again on a later tick.
//!
//! Handlers are removed by the [`HandlerId`] returned at registration.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;

use super::event::{FleetEvent, FleetEventKind};
use crate::error::HandlerError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::panic_message;

/// Async event handler.
pub type Handler =
    Arc<dyn Fn(FleetEvent) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// Wraps an async closure that always accepts the event as a [`Handler`].
///
/// ```
/// use spacevisor::{handler, FleetEvent};
///
/// let h = handler(|ev: FleetEvent| async move {
///     let _ = ev.robot();
/// });
/// # let _ = h;
/// ```
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(FleetEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ev| f(ev).map(Ok::<(), HandlerError>).boxed())
}

/// Wraps an async closure that may refuse the event as a [`Handler`].
///
/// A refusal makes the emitting adapter try again on its next tick.
pub fn fallible_handler<F, Fut>(f: F) -> Handler
where
    F: Fn(FleetEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |ev| f(ev).boxed())
}

/// Registration ticket for [`Dispatcher::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

type Registry = HashMap<FleetEventKind, Vec<(HandlerId, Handler)>>;

/// Per-adapter handler registry.
pub struct Dispatcher {
    fleet: Arc<str>,
    next_id: AtomicU64,
    handlers: Mutex<Registry>,
    bus: Bus,
}

impl Dispatcher {
    pub fn new(fleet: impl Into<Arc<str>>, bus: Bus) -> Self {
        Self {
            fleet: fleet.into(),
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(HashMap::new()),
            bus,
        }
    }

    /// Appends `handler` to the list for `kind`.
    pub fn on(&self, kind: FleetEventKind, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut reg = self.handlers.lock().unwrap_or_else(|p| p.into_inner());
        reg.entry(kind).or_default().push((id, handler));
        id
    }

    /// Removes a handler; returns `false` if it was not registered for `kind`.
    pub fn off(&self, kind: FleetEventKind, id: HandlerId) -> bool {
        let mut reg = self.handlers.lock().unwrap_or_else(|p| p.into_inner());
        let Some(list) = reg.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(hid, _)| *hid != id);
        before != list.len()
    }

    pub fn handler_count(&self, kind: FleetEventKind) -> usize {
        let reg = self.handlers.lock().unwrap_or_else(|p| p.into_inner());
        reg.get(&kind).map_or(0, Vec::len)
    }

    /// Invokes every handler registered for the event's kind, in order.
    ///
    /// Returns `true` when at least one handler ran and every handler accepted the event.
    pub async fn emit(&self, event: FleetEvent) -> bool {
        let kind = event.kind();
        let snapshot: Vec<Handler> = {
            let reg = self.handlers.lock().unwrap_or_else(|p| p.into_inner());
            reg.get(&kind)
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        let mut delivered = !snapshot.is_empty();
        for h in snapshot {
            let ev = event.clone();
            let call = std::panic::AssertUnwindSafe(async move { h(ev).await });
            match call.catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => delivered = false,
                Err(panic) => {
                    delivered = false;
                    self.bus.publish(
                        Event::new(EventKind::HandlerPanicked)
                            .with_fleet(self.fleet.clone())
                            .with_robot(event.robot())
                            .with_space(event.space_id())
                            .with_reason(format!(
                                "{} handler: {}",
                                kind.as_str(),
                                panic_message(&*panic)
                            )),
                    );
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::event::Release;

    fn release() -> FleetEvent {
        FleetEvent::Release(Release {
            fleet_id: "f".into(),
            robot: "r".into(),
            space_id: "s".into(),
            release_time: 1,
        })
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let d = Dispatcher::new("f", Bus::new(8));
        let log = Arc::new(Mutex::new(Vec::new()));

        for n in 1..=3 {
            let log = log.clone();
            d.on(
                FleetEventKind::Release,
                handler(move |_ev| {
                    let log = log.clone();
                    async move { log.lock().unwrap().push(n) }
                }),
            );
        }
        assert!(d.emit(release()).await);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn refused_or_unhandled_events_are_not_delivered() {
        let d = Dispatcher::new("f", Bus::new(8));
        assert!(!d.emit(release()).await);

        let reached = Arc::new(AtomicU64::new(0));
        d.on(
            FleetEventKind::Release,
            fallible_handler(|_ev| async {
                Err(HandlerError::Rejected("store offline".into()))
            }),
        );
        let r = reached.clone();
        d.on(
            FleetEventKind::Release,
            handler(move |_ev| {
                let r = r.clone();
                async move {
                    r.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );

        assert!(!d.emit(release()).await);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn off_removes_only_the_given_handler() {
        let d = Dispatcher::new("f", Bus::new(8));
        let a = d.on(FleetEventKind::Request, handler(|_ev| async {}));
        let b = d.on(FleetEventKind::Request, handler(|_ev| async {}));

        assert!(!d.off(FleetEventKind::Release, a));
        assert!(d.off(FleetEventKind::Request, a));
        assert!(!d.off(FleetEventKind::Request, a));
        assert_eq!(d.handler_count(FleetEventKind::Request), 1);
        assert!(d.off(FleetEventKind::Request, b));
        assert_eq!(d.handler_count(FleetEventKind::Request), 0);
    }

    #[tokio::test]
    async fn a_panicking_handler_does_not_stop_the_rest() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let d = Dispatcher::new("fleet-a", bus);
        let reached = Arc::new(AtomicU64::new(0));

        d.on(
            FleetEventKind::Release,
            handler(|_ev| async { panic!("handler bug"); }),
        );
        let r = reached.clone();
        d.on(
            FleetEventKind::Release,
            handler(move |_ev| {
                let r = r.clone();
                async move {
                    r.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );

        assert!(!d.emit(release()).await);
        assert_eq!(reached.load(Ordering::SeqCst), 1);

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::HandlerPanicked);
        assert_eq!(ev.fleet.as_deref(), Some("fleet-a"));
        assert!(ev.reason.as_deref().unwrap().contains("handler bug"));
    }
}
