//! # Generic fleet adapter over any [`VendorClient`].
//!
//! [`FleetConnector`] runs the adapter event loop: two independent tickers per fleet.
//!
//! ```text
//! request detection (every poll)                 exit detection (every exit poll)
//! ─────────────────────────────                  ──────────────────────────────
//! load missing polygons                          for each tracked lock holder:
//! for each robot, for each space:                  inside polygon        → still within
//!   skip if robot already holds a lock             near entry point      → still entering
//!   waiting && approaching && not pending          otherwise             → stop tracking,
//!     → mark pending, emit Request                                          emit Release
//!     → not delivered: clear pending                  not delivered: track again
//!   otherwise → clear pending
//!
//! grant_access(robot, space)
//!   already held → no-op
//!   unblock (zone) / tag IN_SPACE ── fail → emit GrantFailed
//!   record entry point, re-block zone
//! ```
//!
//! Vendor faults are published as `VendorFailed` and never abort a tick; the next tick
//! simply tries again. The same holds for events the arbiter could not apply: the
//! observation is kept and emitted again on the next tick.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::adapter::{FleetAdapter, GrantOutcome};
use super::dispatch::{Dispatcher, Handler, HandlerId};
use super::event::{AccessRequest, FleetEvent, FleetEventKind, GrantFailed, Release};
use super::tracker::{Containment, SpatialTracker};
use super::vendor::{self, AccessControl, LocationStatus, RobotStatus, VendorClient};
use crate::clock::ClockRef;
use crate::config::Config;
use crate::core::{spawn_periodic, TickerHandle};
use crate::error::{RuntimeError, TaskError, VendorError};
use crate::events::{Bus, Event, EventKind};
use crate::geometry::{build_polygon, Point, Polygon};
use crate::tasks::{TaskFn, TaskRef, TaskSpec};

struct Listeners {
    request: TickerHandle,
    exit: TickerHandle,
}

struct Inner<V> {
    fleet_id: Arc<str>,
    vendor: Arc<V>,
    spaces: Vec<String>,
    polygons: RwLock<HashMap<String, Polygon>>,
    tracker: SpatialTracker,
    dispatcher: Dispatcher,
    cfg: Config,
    clock: ClockRef,
    bus: Bus,
    listeners: Mutex<Option<Listeners>>,
}

/// Fleet adapter for one vendor fleet. Cheap to clone.
pub struct FleetConnector<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for FleetConnector<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: VendorClient> FleetConnector<V> {
    /// Creates an adapter for `fleet_id` watching `spaces`.
    pub fn new<S: Into<String>>(
        fleet_id: impl Into<Arc<str>>,
        vendor: Arc<V>,
        spaces: impl IntoIterator<Item = S>,
        cfg: &Config,
        clock: ClockRef,
        bus: Bus,
    ) -> Self {
        let fleet_id: Arc<str> = fleet_id.into();
        Self {
            inner: Arc::new(Inner {
                dispatcher: Dispatcher::new(fleet_id.clone(), bus.clone()),
                fleet_id,
                vendor,
                spaces: spaces.into_iter().map(Into::into).collect(),
                polygons: RwLock::new(HashMap::new()),
                tracker: SpatialTracker::new(),
                cfg: cfg.clone(),
                clock,
                bus,
                listeners: Mutex::new(None),
            }),
        }
    }

    pub fn vendor(&self) -> &Arc<V> {
        &self.inner.vendor
    }

    pub fn tracker(&self) -> &SpatialTracker {
        &self.inner.tracker
    }

    pub fn spaces(&self) -> &[String] {
        &self.inner.spaces
    }

    /// The cached outline of `space`, if it has been loaded.
    pub async fn polygon(&self, space: &str) -> Option<Polygon> {
        self.inner.polygons.read().await.get(space).cloned()
    }

    /// Runs one request-detection pass now.
    pub async fn poll_requests(&self) {
        self.inner.detect_requests().await;
    }

    /// Runs one exit-detection pass now.
    pub async fn poll_exits(&self) {
        self.inner.detect_exits().await;
    }
}

impl<V: VendorClient> Inner<V> {
    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind).with_fleet(self.fleet_id.clone())
    }

    fn vendor_failed(&self, err: &VendorError, robot: Option<&str>, space: Option<&str>) {
        let mut ev = self.event(EventKind::VendorFailed).with_reason(err.as_message());
        if let Some(robot) = robot {
            ev = ev.with_robot(robot);
        }
        if let Some(space) = space {
            ev = ev.with_space(space);
        }
        self.bus.publish(ev);
    }

    /// Tags `robot` with `status` unless the vendor already shows that tag.
    ///
    /// A tag that cannot be read is written anyway; a failed write is published.
    async fn tag(&self, robot: &str, space: &str, status: LocationStatus) {
        let current = vendor::call(
            "location_status",
            self.cfg.vendor_timeout,
            self.vendor.location_status(robot),
        )
        .await;
        if matches!(current, Ok(Some(s)) if s == status) {
            return;
        }
        if let Err(e) = vendor::call(
            "set_location_status",
            self.cfg.vendor_timeout,
            self.vendor.set_location_status(robot, status),
        )
        .await
        {
            self.vendor_failed(&e, Some(robot), Some(space));
        }
    }

    /// Fetches outlines for spaces not cached yet. Empty outlines stay unconfigured.
    async fn load_polygons(&self) {
        let missing: Vec<String> = {
            let cached = self.polygons.read().await;
            self.spaces
                .iter()
                .filter(|s| !cached.contains_key(s.as_str()))
                .cloned()
                .collect()
        };

        for space in missing {
            let points = match vendor::call(
                "shared_space_polygon",
                self.cfg.vendor_timeout,
                self.vendor.shared_space_polygon(&space),
            )
            .await
            {
                Ok(points) => points,
                Err(e) => {
                    self.vendor_failed(&e, None, Some(&space));
                    continue;
                }
            };
            match build_polygon(&points) {
                Ok(Some(polygon)) => {
                    self.polygons.write().await.insert(space, polygon);
                }
                Ok(None) => {}
                Err(e) => self.bus.publish(
                    self.event(EventKind::PolygonUnavailable)
                        .with_space(space)
                        .with_reason(e.as_message()),
                ),
            }
        }
    }

    async fn robot_position(&self, robot: &str) -> Result<Option<RobotStatus>, VendorError> {
        let status = vendor::call(
            "robot_status",
            self.cfg.vendor_timeout,
            self.vendor.robot_status(robot),
        )
        .await?;
        if !status.position.is_finite() {
            return Ok(None);
        }
        self.tracker.record_position(robot, status.position).await;
        Ok(Some(status))
    }

    async fn detect_requests(&self) {
        self.load_polygons().await;
        let polygons: Vec<(String, Polygon)> = {
            let cached = self.polygons.read().await;
            let mut v: Vec<_> = cached.iter().map(|(k, p)| (k.clone(), p.clone())).collect();
            v.sort_by(|a, b| a.0.cmp(&b.0));
            v
        };
        if polygons.is_empty() {
            return;
        }

        let robots = match vendor::call("robots", self.cfg.vendor_timeout, self.vendor.robots()).await {
            Ok(robots) => robots,
            Err(e) => {
                self.vendor_failed(&e, None, None);
                return;
            }
        };

        for robot in robots {
            let status = match self.robot_position(&robot).await {
                Ok(Some(status)) => status,
                Ok(None) => continue,
                Err(e) => {
                    self.vendor_failed(&e, Some(&robot), None);
                    continue;
                }
            };
            let holder = self.tracker.is_holder(&robot).await;

            for (space, polygon) in &polygons {
                let c = Containment::classify(polygon, status.position, self.cfg.approach_threshold);
                self.tracker.set_containment(&robot, space, c).await;
                if holder {
                    continue;
                }
                if status.state.is_waiting() && c == Containment::Approaching {
                    if self.tracker.mark_pending(&robot, space).await
                        && !self.emit_request(&robot, space).await
                    {
                        self.tracker.clear_pending(&robot, space).await;
                    }
                } else {
                    self.tracker.clear_pending(&robot, space).await;
                }
            }
        }
    }

    /// Returns whether the arbiter accepted the request.
    async fn emit_request(&self, robot: &str, space: &str) -> bool {
        if self.vendor.access_control() == AccessControl::LocationTag {
            self.tag(robot, space, LocationStatus::WaitingForSpace).await;
        }
        let request_time = self.clock.now_millis();
        self.bus.publish(
            self.event(EventKind::AccessRequested)
                .with_robot(robot)
                .with_space(space),
        );
        self.dispatcher
            .emit(FleetEvent::Request(AccessRequest {
                fleet_id: self.fleet_id.to_string(),
                robot: robot.to_string(),
                space_id: space.to_string(),
                request_time,
            }))
            .await
    }

    async fn detect_exits(&self) {
        for (robot, space, held) in self.tracker.holders().await {
            let Some(polygon) = self.polygons.read().await.get(&space).cloned() else {
                continue;
            };
            let p = match self.robot_position(&robot).await {
                Ok(Some(status)) => status.position,
                Ok(None) => continue,
                Err(e) => {
                    self.vendor_failed(&e, Some(&robot), Some(&space));
                    continue;
                }
            };

            let c = Containment::classify(&polygon, p, self.cfg.approach_threshold);
            self.tracker.set_containment(&robot, &space, c).await;
            if c == Containment::Inside {
                continue;
            }
            if p.distance_to(held.entry_point) <= self.cfg.reentry_radius {
                continue;
            }
            let Some(held) = self.tracker.release(&robot, &space).await else {
                continue;
            };
            if !self.emit_release(&robot, &space).await {
                self.tracker.restore(&robot, &space, held).await;
            }
        }
    }

    /// Returns whether the arbiter accepted the release.
    async fn emit_release(&self, robot: &str, space: &str) -> bool {
        if self.vendor.access_control() == AccessControl::LocationTag {
            self.tag(robot, space, LocationStatus::OutOfSpace).await;
        }
        let release_time = self.clock.now_millis();
        self.dispatcher
            .emit(FleetEvent::Release(Release {
                fleet_id: self.fleet_id.to_string(),
                robot: robot.to_string(),
                space_id: space.to_string(),
                release_time,
            }))
            .await
    }

    async fn grant(&self, robot: &str, space: &str) -> GrantOutcome {
        if self.tracker.holds(robot, space).await {
            return GrantOutcome::AlreadyHeld;
        }

        let current = match self.robot_position(robot).await {
            Ok(status) => status.map(|s| s.position),
            Err(e) => {
                self.vendor_failed(&e, Some(robot), Some(space));
                None
            }
        };
        let entry_point: Point = match current {
            Some(p) => p,
            None => match self.tracker.last_point(robot).await {
                Some(p) => p,
                None => return self.grant_failed(robot, space, "robot position unknown".into()).await,
            },
        };

        let access = self.vendor.access_control();
        let command = match access {
            AccessControl::ExclusionZone => {
                vendor::call(
                    "set_space_blocked",
                    self.cfg.vendor_timeout,
                    self.vendor.set_space_blocked(space, false),
                )
                .await
            }
            AccessControl::LocationTag => {
                vendor::call(
                    "set_location_status",
                    self.cfg.vendor_timeout,
                    self.vendor.set_location_status(robot, LocationStatus::InSpace),
                )
                .await
            }
        };
        if let Err(e) = command {
            return self.grant_failed(robot, space, e.as_message()).await;
        }

        // the entry window is brief; close the zone again behind the robot
        if access == AccessControl::ExclusionZone {
            if let Err(e) = vendor::call(
                "set_space_blocked",
                self.cfg.vendor_timeout,
                self.vendor.set_space_blocked(space, true),
            )
            .await
            {
                self.vendor_failed(&e, Some(robot), Some(space));
            }
        }

        if !self
            .tracker
            .grant(robot, space, entry_point, self.clock.now_millis())
            .await
        {
            return GrantOutcome::AlreadyHeld;
        }
        self.bus.publish(
            self.event(EventKind::GrantIssued)
                .with_robot(robot)
                .with_space(space),
        );
        GrantOutcome::Granted
    }

    async fn grant_failed(&self, robot: &str, space: &str, message: String) -> GrantOutcome {
        self.bus.publish(
            self.event(EventKind::GrantFailed)
                .with_robot(robot)
                .with_space(space)
                .with_reason(message.clone()),
        );
        self.dispatcher
            .emit(FleetEvent::GrantFailed(GrantFailed {
                robot: robot.to_string(),
                space_id: space.to_string(),
                message,
            }))
            .await;
        GrantOutcome::Failed
    }
}

fn detection_task<V, F, Fut>(inner: &Arc<Inner<V>>, what: &str, pass: F) -> TaskRef
where
    V: VendorClient,
    F: Fn(Arc<Inner<V>>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let inner = Arc::clone(inner);
    TaskFn::arc(
        format!("{}/{what}", inner.fleet_id),
        move |_ctx: CancellationToken| {
            let run = pass(Arc::clone(&inner));
            async move {
                run.await;
                Ok::<(), TaskError>(())
            }
        },
    )
}

#[async_trait]
impl<V: VendorClient> FleetAdapter for FleetConnector<V> {
    fn fleet_id(&self) -> &str {
        &self.inner.fleet_id
    }

    fn start_shared_space_listener(&self, poll: Duration) -> Result<(), RuntimeError> {
        let inner = &self.inner;
        let mut slot = inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(RuntimeError::ListenerAlreadyRunning {
                fleet: inner.fleet_id.to_string(),
            });
        }

        let exit_poll = inner.cfg.exit_poll.unwrap_or(poll);
        let request = detection_task(inner, "request-detection", |i| async move {
            i.detect_requests().await
        });
        let exit = detection_task(inner, "exit-detection", |i| async move { i.detect_exits().await });

        *slot = Some(Listeners {
            request: spawn_periodic(TaskSpec::with_defaults(request, poll, &inner.cfg), inner.bus.clone()),
            exit: spawn_periodic(TaskSpec::with_defaults(exit, exit_poll, &inner.cfg), inner.bus.clone()),
        });
        inner.bus.publish(inner.event(EventKind::ListenerStarted));
        Ok(())
    }

    fn stop_shared_space_listener(&self) -> Result<(), RuntimeError> {
        let inner = &self.inner;
        let taken = inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(listeners) = taken else {
            return Err(RuntimeError::ListenerNotRunning {
                fleet: inner.fleet_id.to_string(),
            });
        };
        listeners.request.stop();
        listeners.exit.stop();
        inner.bus.publish(inner.event(EventKind::ListenerStopped));
        Ok(())
    }

    fn is_listening(&self) -> bool {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn grant_access(&self, robot: &str, space: &str) -> GrantOutcome {
        self.inner.grant(robot, space).await
    }

    fn on_event(&self, kind: FleetEventKind, handler: Handler) -> HandlerId {
        self.inner.dispatcher.on(kind, handler)
    }

    fn off(&self, kind: FleetEventKind, id: HandlerId) -> bool {
        self.inner.dispatcher.off(kind, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::error::HandlerError;
    use crate::fleet::dispatch::{fallible_handler, handler};
    use crate::fleet::sim::{SimulatedFleet, VendorCommand};
    use crate::fleet::vendor::RobotState;

    const DOOR: [(f64, f64); 4] = [(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)];
    const T0: u64 = 1_700_000_000_000;

    struct Fixture {
        connector: FleetConnector<SimulatedFleet>,
        sim: Arc<SimulatedFleet>,
        clock: Arc<ManualClock>,
        bus: Bus,
    }

    fn fixture(access: AccessControl) -> Fixture {
        let sim = Arc::new(
            SimulatedFleet::new(access)
                .with_space("door", &DOOR)
                .with_robot("amr-1", (11.0, 5.0), RobotState::Waiting),
        );
        let clock = Arc::new(ManualClock::new(T0));
        let bus = Bus::new(64);
        let connector = FleetConnector::new(
            "fleet-a",
            sim.clone(),
            ["door"],
            &Config::default(),
            clock.clone(),
            bus.clone(),
        );
        Fixture {
            connector,
            sim,
            clock,
            bus,
        }
    }

    fn collect(adapter: &dyn FleetAdapter, kind: FleetEventKind) -> Arc<Mutex<Vec<FleetEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        adapter.on_event(
            kind,
            handler(move |ev| {
                let sink = sink.clone();
                async move { sink.lock().unwrap().push(ev) }
            }),
        );
        seen
    }

    /// Registers a handler for `kind` refusing its first `refusals` events; counts calls.
    fn refusing(adapter: &dyn FleetAdapter, kind: FleetEventKind, refusals: u32) -> Arc<AtomicU32> {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        adapter.on_event(
            kind,
            fallible_handler(move |_ev| {
                let n = seen.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < refusals {
                        Err(HandlerError::Rejected("queue unavailable".into()))
                    } else {
                        Ok(())
                    }
                }
            }),
        );
        calls
    }

    #[tokio::test]
    async fn refused_request_is_emitted_again_until_accepted() {
        let f = fixture(AccessControl::ExclusionZone);
        let calls = refusing(&f.connector, FleetEventKind::Request, 2);

        f.connector.poll_requests().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let state = f.connector.tracker().snapshot("amr-1").await.unwrap();
        assert!(state.pending.is_empty());

        f.connector.poll_requests().await;
        f.connector.poll_requests().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // accepted: back to once per waiting episode
        f.connector.poll_requests().await;
        f.connector.poll_requests().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let state = f.connector.tracker().snapshot("amr-1").await.unwrap();
        assert!(state.pending.contains("door"));
    }

    #[tokio::test]
    async fn refused_release_keeps_the_robot_tracked() {
        let f = fixture(AccessControl::ExclusionZone);
        let calls = refusing(&f.connector, FleetEventKind::Release, 1);
        f.connector.poll_requests().await;
        f.connector.grant_access("amr-1", "door").await;

        f.sim.move_to("amr-1", (-4.0, 5.0));
        f.connector.poll_exits().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(f.connector.tracker().holds("amr-1", "door").await);

        f.connector.poll_exits().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!f.connector.tracker().holds("amr-1", "door").await);

        f.connector.poll_exits().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retried_request_does_not_retag_the_robot() {
        let f = fixture(AccessControl::LocationTag);
        let calls = refusing(&f.connector, FleetEventKind::Request, 1);

        f.connector.poll_requests().await;
        f.connector.poll_requests().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            f.sim.commands(),
            vec![VendorCommand::SetLocationStatus {
                robot: "amr-1".into(),
                status: LocationStatus::WaitingForSpace,
            }]
        );
    }

    #[tokio::test]
    async fn request_is_emitted_once_per_waiting_episode() {
        let f = fixture(AccessControl::ExclusionZone);
        let requests = collect(&f.connector, FleetEventKind::Request);

        f.connector.poll_requests().await;
        f.clock.advance(Duration::from_secs(1));
        f.connector.poll_requests().await;
        assert_eq!(
            *requests.lock().unwrap(),
            vec![FleetEvent::Request(AccessRequest {
                fleet_id: "fleet-a".into(),
                robot: "amr-1".into(),
                space_id: "door".into(),
                request_time: T0,
            })]
        );

        // robot moves on, then stops at the door again: a new episode
        f.sim.set_state("amr-1", RobotState::Moving);
        f.connector.poll_requests().await;
        f.sim.set_state("amr-1", RobotState::Waiting);
        f.connector.poll_requests().await;
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn only_waiting_robots_within_threshold_request() {
        let f = fixture(AccessControl::ExclusionZone);
        f.sim.place("far", (13.0, 5.0), RobotState::Waiting);
        f.sim.place("passing", (11.0, 2.0), RobotState::Moving);
        f.sim.place("inside", (5.0, 5.0), RobotState::Blocked);
        let requests = collect(&f.connector, FleetEventKind::Request);

        f.connector.poll_requests().await;
        let robots: Vec<_> = requests
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.robot().to_string())
            .collect();
        assert_eq!(robots, vec!["amr-1"]);

        let state = f.connector.tracker().snapshot("far").await.unwrap();
        assert_eq!(state.containment["door"], Containment::Outside);
        let state = f.connector.tracker().snapshot("inside").await.unwrap();
        assert_eq!(state.containment["door"], Containment::Inside);
    }

    #[tokio::test]
    async fn grant_is_idempotent_and_reblocks_the_zone() {
        let f = fixture(AccessControl::ExclusionZone);
        f.connector.poll_requests().await;

        assert_eq!(f.connector.grant_access("amr-1", "door").await, GrantOutcome::Granted);
        let expected = vec![
            VendorCommand::SetSpaceBlocked {
                space: "door".into(),
                blocked: false,
            },
            VendorCommand::SetSpaceBlocked {
                space: "door".into(),
                blocked: true,
            },
        ];
        assert_eq!(f.sim.commands(), expected);
        assert_eq!(f.sim.is_blocked("door"), Some(true));

        f.sim.move_to("amr-1", (5.0, 5.0));
        assert_eq!(
            f.connector.grant_access("amr-1", "door").await,
            GrantOutcome::AlreadyHeld
        );
        assert_eq!(f.sim.commands(), expected);

        let state = f.connector.tracker().snapshot("amr-1").await.unwrap();
        assert_eq!(state.held["door"].entry_point, Point::new(11.0, 5.0));
        assert!(state.pending.is_empty());
    }

    #[tokio::test]
    async fn holders_do_not_request_again() {
        let f = fixture(AccessControl::ExclusionZone);
        let requests = collect(&f.connector, FleetEventKind::Request);
        f.connector.poll_requests().await;
        f.connector.grant_access("amr-1", "door").await;

        f.sim.set_state("amr-1", RobotState::Moving);
        f.connector.poll_requests().await;
        f.sim.set_state("amr-1", RobotState::Waiting);
        f.connector.poll_requests().await;
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn release_waits_until_clear_of_entry_point() {
        let f = fixture(AccessControl::ExclusionZone);
        let releases = collect(&f.connector, FleetEventKind::Release);
        f.connector.poll_requests().await;
        f.connector.grant_access("amr-1", "door").await;

        // not moved yet: outside, but at the entry point
        f.connector.poll_exits().await;
        // crossing
        f.sim.move_to("amr-1", (5.0, 5.0));
        f.connector.poll_exits().await;
        // back near where it entered
        f.sim.move_to("amr-1", (12.0, 5.0));
        f.connector.poll_exits().await;
        assert!(releases.lock().unwrap().is_empty());

        f.sim.move_to("amr-1", (-4.0, 5.0));
        f.clock.advance(Duration::from_secs(30));
        f.connector.poll_exits().await;
        f.connector.poll_exits().await;

        assert_eq!(
            *releases.lock().unwrap(),
            vec![FleetEvent::Release(Release {
                fleet_id: "fleet-a".into(),
                robot: "amr-1".into(),
                space_id: "door".into(),
                release_time: T0 + 30_000,
            })]
        );
        assert!(!f.connector.tracker().holds("amr-1", "door").await);
    }

    #[tokio::test]
    async fn failed_grant_emits_grant_failed_and_records_nothing() {
        let f = fixture(AccessControl::ExclusionZone);
        let mut rx = f.bus.subscribe();
        let failures = collect(&f.connector, FleetEventKind::GrantFailed);
        f.sim.fail_commands(true);

        assert_eq!(f.connector.grant_access("amr-1", "door").await, GrantOutcome::Failed);
        assert!(!f.connector.tracker().holds("amr-1", "door").await);
        assert!(f.sim.commands().is_empty());

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert!(matches!(&failures[0], FleetEvent::GrantFailed(g) if g.message.contains("rejected")));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::GrantFailed);
        assert_eq!(ev.robot.as_deref(), Some("amr-1"));
    }

    #[tokio::test]
    async fn location_tag_fleet_is_tagged_through_the_crossing() {
        let f = fixture(AccessControl::LocationTag);
        f.connector.poll_requests().await;
        assert_eq!(f.sim.tag_of("amr-1"), Some(LocationStatus::WaitingForSpace));

        assert_eq!(f.connector.grant_access("amr-1", "door").await, GrantOutcome::Granted);
        assert_eq!(f.sim.tag_of("amr-1"), Some(LocationStatus::InSpace));

        f.sim.move_to("amr-1", (-4.0, 5.0));
        f.connector.poll_exits().await;
        assert_eq!(f.sim.tag_of("amr-1"), Some(LocationStatus::OutOfSpace));
        assert!(f
            .sim
            .commands()
            .iter()
            .all(|c| matches!(c, VendorCommand::SetLocationStatus { .. })));
    }

    #[tokio::test]
    async fn unconfigured_space_is_loaded_later() {
        let f = fixture(AccessControl::ExclusionZone);
        f.sim.set_outline("door", &[]);
        let requests = collect(&f.connector, FleetEventKind::Request);

        f.connector.poll_requests().await;
        assert!(f.connector.polygon("door").await.is_none());
        assert!(requests.lock().unwrap().is_empty());

        f.sim.set_outline("door", &DOOR);
        f.connector.poll_requests().await;
        assert!(f.connector.polygon("door").await.is_some());
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn vendor_faults_are_published() {
        let f = fixture(AccessControl::ExclusionZone);
        let mut rx = f.bus.subscribe();
        f.sim.fail_listing(true);
        f.connector.poll_requests().await;

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::VendorFailed);
        assert_eq!(ev.fleet.as_deref(), Some("fleet-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn listener_lifecycle_and_ticking() {
        let f = fixture(AccessControl::ExclusionZone);
        let requests = collect(&f.connector, FleetEventKind::Request);

        assert!(matches!(
            f.connector.stop_shared_space_listener(),
            Err(RuntimeError::ListenerNotRunning { .. })
        ));
        f.connector
            .start_shared_space_listener(Duration::from_millis(100))
            .unwrap();
        assert!(f.connector.is_listening());
        assert!(matches!(
            f.connector.start_shared_space_listener(Duration::from_millis(100)),
            Err(RuntimeError::ListenerAlreadyRunning { .. })
        ));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(requests.lock().unwrap().len(), 1);

        f.connector.stop_shared_space_listener().unwrap();
        assert!(!f.connector.is_listening());
        assert!(f.connector.stop_shared_space_listener().is_err());
    }
}
