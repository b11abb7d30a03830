//! # Runtime events emitted by adapters, the arbiter and tickers.
//!
//! [`EventKind`] groups events into:
//! - **Protocol events**: the request → lock → release lifecycle of a shared space
//! - **Fault events**: absorbed failures (store, vendor, configuration, mismatch, timeout)
//! - **Lifecycle events**: listeners, arbiter, tickers, shutdown
//! - **Subscriber events**: overflow and panic isolation
//!
//! ## Ordering guarantees
//! Each event has a globally unique, monotonically increasing `seq`.
//!
//! ## Example
//! ```rust
//! use spacevisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::CrossingTimeout)
//!     .with_space("fire-door-3")
//!     .with_robot("amr-17")
//!     .with_overdue(1_500);
//!
//! assert_eq!(ev.kind, EventKind::CrossingTimeout);
//! assert_eq!(ev.robot.as_deref(), Some("amr-17"));
//! assert_eq!(ev.overdue_ms, Some(1_500));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::clock::EpochMillis;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Protocol ===
    /// An adapter detected a waiting robot next to a space.
    ///
    /// Sets: `fleet`, `robot`, `space`
    AccessRequested,

    /// The arbiter inserted a request record.
    ///
    /// Sets: `fleet`, `robot`, `space`
    RequestQueued,

    /// A request re-submission found its record already present.
    ///
    /// Sets: `fleet`, `robot`, `space`
    RequestDuplicate,

    /// A request was atomically promoted to the lock.
    ///
    /// Sets: `fleet`, `robot`, `space`, `deadline_ms`
    LockPromoted,

    /// An adapter unblocked the robot.
    ///
    /// Sets: `fleet`, `robot`, `space`
    GrantIssued,

    /// An adapter failed to unblock the robot.
    ///
    /// Sets: `fleet` (when known), `robot`, `space`, `reason`
    GrantFailed,

    /// A lock whose grant failed went back into the queue.
    ///
    /// Sets: `fleet`, `robot`, `space`
    GrantReverted,

    /// The lock holder physically exited and the lock was deleted.
    ///
    /// Sets: `fleet`, `robot`, `space`
    LockReleased,

    // === Faults ===
    /// A release named a robot that does not hold the lock, or no lock exists.
    ///
    /// Sets: `fleet`, `robot` (the releasing robot), `space`, `reason`
    ReleaseMismatch,

    /// The lock holder is past its crossing deadline. Advisory only.
    ///
    /// Sets: `fleet`, `robot`, `space`, `deadline_ms`, `overdue_ms`
    CrossingTimeout,

    /// A queued request belongs to a fleet the arbiter holds no adapter for.
    ///
    /// Sets: `fleet`, `robot`, `space`
    AdapterMissing,

    /// A store operation failed or a conditional write lost.
    ///
    /// Sets: `space`, `reason`
    StoreFailed,

    /// A vendor call failed or timed out.
    ///
    /// Sets: `fleet`, `robot` (when relevant), `space` (when relevant), `reason`
    VendorFailed,

    /// A vendor returned an unusable polygon for a space.
    ///
    /// Sets: `fleet`, `space`, `reason`
    PolygonUnavailable,

    // === Lifecycle ===
    /// A fleet adapter started its request/exit listeners.
    ListenerStarted,
    /// A fleet adapter stopped its listeners.
    ListenerStopped,
    /// The arbiter registered its handlers and started ticking.
    ArbiterStarted,
    /// The arbiter unregistered its handlers and stopped ticking.
    ArbiterStopped,
    /// A tick exceeded its timeout. Sets: `task`, `tick`, `reason`
    TickTimeout,
    /// A tick returned an error. Sets: `task`, `tick`, `reason`
    TickFailed,
    /// A fleet event handler panicked. Sets: `fleet`, `reason`
    HandlerPanicked,
    /// Shutdown requested (OS signal observed).
    ShutdownRequested,

    // === Subscribers ===
    /// A subscriber panicked while handling an event. Sets: `task`, `reason`
    SubscriberPanicked,
    /// A subscriber dropped an event (queue full or closed). Sets: `task`, `reason`
    SubscriberOverflow,
}

impl EventKind {
    /// Short stable label for logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            EventKind::AccessRequested => "access_requested",
            EventKind::RequestQueued => "request_queued",
            EventKind::RequestDuplicate => "request_duplicate",
            EventKind::LockPromoted => "lock_promoted",
            EventKind::GrantIssued => "grant_issued",
            EventKind::GrantFailed => "grant_failed",
            EventKind::GrantReverted => "grant_reverted",
            EventKind::LockReleased => "lock_released",
            EventKind::ReleaseMismatch => "release_mismatch",
            EventKind::CrossingTimeout => "crossing_timeout",
            EventKind::AdapterMissing => "adapter_missing",
            EventKind::StoreFailed => "store_failed",
            EventKind::VendorFailed => "vendor_failed",
            EventKind::PolygonUnavailable => "polygon_unavailable",
            EventKind::ListenerStarted => "listener_started",
            EventKind::ListenerStopped => "listener_stopped",
            EventKind::ArbiterStarted => "arbiter_started",
            EventKind::ArbiterStopped => "arbiter_stopped",
            EventKind::TickTimeout => "tick_timeout",
            EventKind::TickFailed => "tick_failed",
            EventKind::HandlerPanicked => "handler_panicked",
            EventKind::ShutdownRequested => "shutdown_requested",
            EventKind::SubscriberPanicked => "subscriber_panicked",
            EventKind::SubscriberOverflow => "subscriber_overflow",
        }
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    pub seq: u64,
    pub at: SystemTime,
    pub kind: EventKind,

    pub site: Option<Arc<str>>,
    pub space: Option<Arc<str>>,
    pub fleet: Option<Arc<str>>,
    pub robot: Option<Arc<str>>,
    /// Ticker or subscriber name.
    pub task: Option<Arc<str>>,
    /// Human-readable reason (errors, mismatch details, etc.).
    pub reason: Option<Arc<str>>,
    /// Crossing deadline of the lock involved (epoch millis).
    pub deadline_ms: Option<EpochMillis>,
    /// How far past the deadline the lock holder is.
    pub overdue_ms: Option<u64>,
    /// Tick counter of the ticker (starting from 1).
    pub tick: Option<u64>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            site: None,
            space: None,
            fleet: None,
            robot: None,
            task: None,
            reason: None,
            deadline_ms: None,
            overdue_ms: None,
            tick: None,
        }
    }

    #[inline]
    pub fn with_site(mut self, site: impl Into<Arc<str>>) -> Self {
        self.site = Some(site.into());
        self
    }

    #[inline]
    pub fn with_space(mut self, space: impl Into<Arc<str>>) -> Self {
        self.space = Some(space.into());
        self
    }

    #[inline]
    pub fn with_fleet(mut self, fleet: impl Into<Arc<str>>) -> Self {
        self.fleet = Some(fleet.into());
        self
    }

    #[inline]
    pub fn with_robot(mut self, robot: impl Into<Arc<str>>) -> Self {
        self.robot = Some(robot.into());
        self
    }

    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_deadline(mut self, deadline: EpochMillis) -> Self {
        self.deadline_ms = Some(deadline);
        self
    }

    #[inline]
    pub fn with_overdue(mut self, overdue_ms: u64) -> Self {
        self.overdue_ms = Some(overdue_ms);
        self
    }

    #[inline]
    pub fn with_tick(mut self, tick: u64) -> Self {
        self.tick = Some(tick);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }
}
