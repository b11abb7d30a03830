use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tokio_util::sync::CancellationToken;

use crate::clock::{millis, ClockRef};
use crate::config::Config;
use crate::core::{spawn_periodic, TickerHandle};
use crate::error::{ConfigError, HandlerError, RuntimeError, StoreError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::fleet::{
    fallible_handler, AccessRequest, AdapterRef, FleetEvent, FleetEventKind, GrantFailed,
    Handler, HandlerId, Release,
};
use crate::model::{OrderKey, QueueRecord, SharedSpace, SpaceState};
use crate::store::{Enqueued, StoreRef};
use crate::tasks::{TaskFn, TaskSpec};

/// Attempts at finding a free order key when two robots request in the same millisecond.
const MAX_SLOT_PROBES: u64 = 8;

const HANDLED_KINDS: [FleetEventKind; 3] = [
    FleetEventKind::Request,
    FleetEventKind::Release,
    FleetEventKind::GrantFailed,
];

struct Running {
    ticker: TickerHandle,
    registrations: Vec<(AdapterRef, FleetEventKind, HandlerId)>,
}

struct Inner {
    site: Arc<str>,
    store: StoreRef,
    clock: ClockRef,
    bus: Bus,
    cfg: Config,
    spaces: RwLock<Vec<SharedSpace>>,
    adapters: RwLock<HashMap<String, AdapterRef>>,
    running: Mutex<Option<Running>>,
}

/// # Arbitration engine for one site.
///
/// Serializes access to the site's shared spaces. All lock state lives in the
/// [`QueueStore`](crate::QueueStore); the engine keeps only a derived
/// [`SpaceState`] per space for observation.
///
/// ```text
///             ┌────────── tick (every arbiter_period) ──────────┐
///             │ for each space:                                 │
///             │   lock present → overdue? → CrossingTimeout     │
///             │   no lock      → next_in_order → adapter known? │
///             │                    → promote_to_lock            │
///             │                    → adapter.grant_access       │
///             └─────────────────────────────────────────────────┘
///  Request      ──► on_access_request ──► enqueue (one record per robot)
///  Release      ──► on_release        ──► delete lock (holder only)
///  GrantFailed  ──► on_grant_failed   ──► revert lock to its request
/// ```
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Arbiter {
    inner: Arc<Inner>,
}

impl Arbiter {
    pub fn new(
        site: impl Into<Arc<str>>,
        spaces: Vec<SharedSpace>,
        store: StoreRef,
        clock: ClockRef,
        bus: Bus,
        cfg: &Config,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                site: site.into(),
                store,
                clock,
                bus,
                cfg: cfg.clone(),
                spaces: RwLock::new(spaces),
                adapters: RwLock::new(HashMap::new()),
                running: Mutex::new(None),
            }),
        }
    }

    pub fn site(&self) -> &str {
        &self.inner.site
    }

    pub fn store(&self) -> &StoreRef {
        &self.inner.store
    }

    /// Registers the engine's handlers on every adapter and starts the site tick.
    ///
    /// Fails if already started, or if two adapters share a fleet id.
    pub fn start(&self, adapters: Vec<AdapterRef>) -> Result<(), RuntimeError> {
        let inner = &self.inner;
        let mut running = inner.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Err(RuntimeError::ArbiterAlreadyStarted {
                site: inner.site.to_string(),
            });
        }

        let mut by_fleet = HashMap::with_capacity(adapters.len());
        for adapter in &adapters {
            let fleet = adapter.fleet_id().to_string();
            if by_fleet.insert(fleet.clone(), Arc::clone(adapter)).is_some() {
                return Err(ConfigError::Invalid(format!("fleet '{fleet}' registered twice")).into());
            }
        }

        let mut registrations = Vec::with_capacity(adapters.len() * HANDLED_KINDS.len());
        for adapter in adapters {
            for kind in HANDLED_KINDS {
                let id = adapter.on_event(kind, router(Arc::downgrade(inner)));
                registrations.push((Arc::clone(&adapter), kind, id));
            }
        }
        *inner.adapters.write().unwrap_or_else(PoisonError::into_inner) = by_fleet;

        let tick_inner = Arc::clone(inner);
        let task = TaskFn::arc(
            format!("{}/arbiter", inner.site),
            move |_ctx: CancellationToken| {
                let inner = Arc::clone(&tick_inner);
                async move {
                    inner.tick().await;
                    Ok::<(), TaskError>(())
                }
            },
        );
        let spec = TaskSpec::with_defaults(task, inner.cfg.arbiter_period, &inner.cfg);
        *running = Some(Running {
            ticker: spawn_periodic(spec, inner.bus.clone()),
            registrations,
        });

        inner.bus.publish(Event::new(EventKind::ArbiterStarted).with_site(inner.site.clone()));
        Ok(())
    }

    /// Unregisters the handlers and stops the tick. A tick in flight completes.
    ///
    /// Fails with the fatal [`RuntimeError::ArbiterNotStarted`] when not running.
    pub fn stop(&self) -> Result<(), RuntimeError> {
        let inner = &self.inner;
        let taken = inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(running) = taken else {
            return Err(RuntimeError::ArbiterNotStarted {
                site: inner.site.to_string(),
            });
        };

        for (adapter, kind, id) in running.registrations {
            adapter.off(kind, id);
        }
        running.ticker.stop();
        inner
            .adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        inner.bus.publish(Event::new(EventKind::ArbiterStopped).with_site(inner.site.clone()));
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Runs one arbitration pass over every space now.
    pub async fn tick(&self) {
        self.inner.tick().await;
    }

    /// Queues a request. `Ok` once the robot is queued, including when it already was.
    pub async fn on_access_request(&self, ev: &AccessRequest) -> Result<(), HandlerError> {
        self.inner.on_access_request(ev).await
    }

    /// Clears the lock of a departed holder. Mismatches are reported and accepted.
    pub async fn on_release(&self, ev: &Release) -> Result<(), HandlerError> {
        self.inner.on_release(ev).await
    }

    pub async fn on_grant_failed(&self, ev: &GrantFailed) -> Result<(), HandlerError> {
        self.inner.on_grant_failed(ev).await
    }

    /// Last observed occupancy of `space`.
    pub fn space_state(&self, space: &str) -> Option<SpaceState> {
        self.inner
            .spaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| s.id == space)
            .map(|s| s.state)
    }

    pub fn spaces(&self) -> Vec<SharedSpace> {
        self.inner
            .spaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// One handler for all three kinds; holds the engine weakly so adapters never keep it alive.
fn router(engine: Weak<Inner>) -> Handler {
    fallible_handler(move |ev: FleetEvent| {
        let engine = engine.clone();
        async move {
            let Some(inner) = engine.upgrade() else {
                return Err(HandlerError::Rejected("arbiter dropped".into()));
            };
            match ev {
                FleetEvent::Request(e) => inner.on_access_request(&e).await,
                FleetEvent::Release(e) => inner.on_release(&e).await,
                FleetEvent::GrantFailed(e) => inner.on_grant_failed(&e).await,
            }
        }
    })
}

impl Inner {
    fn event(&self, kind: EventKind, space: &str) -> Event {
        Event::new(kind)
            .with_site(self.site.clone())
            .with_space(space)
    }

    fn record_event(&self, kind: EventKind, r: &QueueRecord) -> Event {
        self.event(kind, &r.space_id)
            .with_fleet(r.fleet_id.as_str())
            .with_robot(r.robot.as_str())
    }

    fn store_failed(&self, space: &str, err: &StoreError) {
        self.bus.publish(
            self.event(EventKind::StoreFailed, space)
                .with_reason(err.as_message()),
        );
    }

    /// Reports `err` and hands it back to the emitting adapter.
    fn store_failed_handler(&self, space: &str, err: StoreError) -> Result<(), HandlerError> {
        self.store_failed(space, &err);
        Err(err.into())
    }

    fn set_state(&self, space: &str, state: SpaceState) {
        let mut spaces = self.spaces.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(s) = spaces.iter_mut().find(|s| s.id == space) {
            s.state = state;
        }
    }

    fn expiry(&self) -> u64 {
        self.clock.now_secs() + self.cfg.request_ttl.as_secs()
    }

    fn adapter(&self, fleet: &str) -> Option<AdapterRef> {
        self.adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fleet)
            .cloned()
    }

    async fn on_access_request(&self, ev: &AccessRequest) -> Result<(), HandlerError> {
        let space = ev.space_id.as_str();
        let mut record =
            QueueRecord::request(space, &ev.fleet_id, &ev.robot, ev.request_time, self.expiry());
        for _ in 0..MAX_SLOT_PROBES {
            match self.store.enqueue(record.clone()).await {
                Ok(Enqueued::Queued) => {
                    self.bus.publish(self.record_event(EventKind::RequestQueued, &record));
                    return Ok(());
                }
                Ok(Enqueued::AlreadyQueued) => {
                    self.bus.publish(self.record_event(EventKind::RequestDuplicate, &record));
                    return Ok(());
                }
                Ok(Enqueued::SlotTaken) => {
                    // another robot requested in the same millisecond
                    record.requested_at += 1;
                    record.order_key = OrderKey::Requested(record.requested_at);
                }
                Err(e) => return self.store_failed_handler(space, e),
            }
        }
        let reason = "no free queue slot near the request time";
        self.bus.publish(
            self.record_event(EventKind::StoreFailed, &record)
                .with_reason(reason),
        );
        Err(HandlerError::Rejected(reason.into()))
    }

    async fn on_release(&self, ev: &Release) -> Result<(), HandlerError> {
        let space = ev.space_id.as_str();
        let mismatch = |reason: String| {
            self.bus.publish(
                self.event(EventKind::ReleaseMismatch, space)
                    .with_fleet(ev.fleet_id.as_str())
                    .with_robot(ev.robot.as_str())
                    .with_reason(reason),
            );
        };

        let lock = match self.store.current_lock_holder(space).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                mismatch("no lock held".into());
                return Ok(());
            }
            Err(e) => return self.store_failed_handler(space, e),
        };
        if !lock.names(&ev.robot) || lock.fleet_id != ev.fleet_id {
            mismatch(format!("lock held by {}/{}", lock.fleet_id, lock.robot));
            return Ok(());
        }

        match self.store.delete(&lock).await {
            Ok(true) => {
                self.set_state(space, SpaceState::Open);
                self.bus.publish(self.record_event(EventKind::LockReleased, &lock));
            }
            Ok(false) => mismatch("lock vanished before delete".into()),
            Err(e) => return self.store_failed_handler(space, e),
        }
        Ok(())
    }

    async fn on_grant_failed(&self, ev: &GrantFailed) -> Result<(), HandlerError> {
        let space = ev.space_id.as_str();
        let lock = match self.store.current_lock_holder(space).await {
            Ok(Some(lock)) if lock.names(&ev.robot) => lock,
            Ok(_) => return Ok(()),
            Err(e) => return self.store_failed_handler(space, e),
        };

        let request = lock.to_request(self.expiry());
        match self.store.revert_lock(&lock, &request).await {
            Ok(()) => {
                self.set_state(space, SpaceState::Open);
                self.bus.publish(
                    self.record_event(EventKind::GrantReverted, &lock)
                        .with_reason(ev.message.as_str()),
                );
                Ok(())
            }
            Err(e) => self.store_failed_handler(space, e),
        }
    }

    async fn tick(&self) {
        if let Err(e) = self.store.reap_expired().await {
            self.bus.publish(
                Event::new(EventKind::StoreFailed)
                    .with_site(self.site.clone())
                    .with_reason(e.as_message()),
            );
        }

        let ids: Vec<String> = self
            .spaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.id.clone())
            .collect();

        for space in ids {
            match self.store.current_lock_holder(&space).await {
                Ok(Some(lock)) => {
                    self.set_state(&space, SpaceState::Occupied);
                    self.check_deadline(&lock);
                }
                Ok(None) => {
                    self.set_state(&space, SpaceState::Open);
                    match self.store.next_in_order(&space).await {
                        Ok(Some(request)) => self.promote(request).await,
                        Ok(None) => {}
                        Err(e) => self.store_failed(&space, &e),
                    }
                }
                Err(e) => self.store_failed(&space, &e),
            }
        }
    }

    /// Reports an overdue lock holder. The lock stays: only a physical exit clears it.
    fn check_deadline(&self, lock: &QueueRecord) {
        let now = self.clock.now_millis();
        let Some(deadline) = lock.crossing_deadline else {
            return;
        };
        if lock.is_overdue(now) {
            self.bus.publish(
                self.record_event(EventKind::CrossingTimeout, lock)
                    .with_deadline(deadline)
                    .with_overdue(now - deadline),
            );
        }
    }

    async fn promote(&self, request: QueueRecord) {
        let Some(adapter) = self.adapter(&request.fleet_id) else {
            self.bus.publish(self.record_event(EventKind::AdapterMissing, &request));
            return;
        };

        let deadline = self.clock.now_millis() + millis(self.cfg.crossing_budget);
        let lock = request.to_lock(deadline, self.expiry());
        if let Err(e) = self.store.promote_to_lock(&lock, &request).await {
            self.store_failed(&request.space_id, &e);
            return;
        }
        self.set_state(&lock.space_id, SpaceState::Occupied);
        self.bus.publish(
            self.record_event(EventKind::LockPromoted, &lock)
                .with_deadline(deadline),
        );

        // a failed grant comes back through the GrantFailed handler and reverts the lock
        adapter.grant_access(&lock.robot, &lock.space_id).await;
    }
}
