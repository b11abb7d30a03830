//! # LogWriter: events as structured `tracing` records
//!
//! Maps every [`Event`] onto a `tracing` record with the event's metadata as fields.
//! Protocol events log at `info`, faults at `warn` (configuration and store faults at
//! `error`), lifecycle at `debug`.
//!
//! Install any `tracing` subscriber (e.g. `tracing_subscriber::fmt`) to see the output.
//!
//! ```text
//! INFO  spacevisor: lock_promoted space="fire-door-3" fleet="fleet-a" robot="amr-17" deadline_ms=1700000120000
//! WARN  spacevisor: crossing_timeout space="fire-door-3" robot="amr-17" overdue_ms=1500
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Structured log subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let label = e.kind.as_label();
        let space = e.space.as_deref().unwrap_or("-");
        let fleet = e.fleet.as_deref().unwrap_or("-");
        let robot = e.robot.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::AccessRequested
            | EventKind::RequestQueued
            | EventKind::LockPromoted
            | EventKind::GrantIssued
            | EventKind::GrantReverted
            | EventKind::LockReleased => {
                info!(
                    target: "spacevisor",
                    seq = e.seq,
                    space,
                    fleet,
                    robot,
                    deadline_ms = e.deadline_ms,
                    "{label}"
                );
            }
            EventKind::RequestDuplicate => {
                debug!(target: "spacevisor", seq = e.seq, space, fleet, robot, "{label}");
            }
            EventKind::CrossingTimeout => {
                warn!(
                    target: "spacevisor",
                    seq = e.seq,
                    space,
                    fleet,
                    robot,
                    deadline_ms = e.deadline_ms,
                    overdue_ms = e.overdue_ms,
                    "{label}"
                );
            }
            EventKind::AdapterMissing | EventKind::StoreFailed => {
                error!(target: "spacevisor", seq = e.seq, space, fleet, robot, reason, "{label}");
            }
            EventKind::GrantFailed
            | EventKind::ReleaseMismatch
            | EventKind::VendorFailed
            | EventKind::PolygonUnavailable
            | EventKind::HandlerPanicked => {
                warn!(target: "spacevisor", seq = e.seq, space, fleet, robot, reason, "{label}");
            }
            EventKind::TickTimeout
            | EventKind::TickFailed
            | EventKind::SubscriberPanicked
            | EventKind::SubscriberOverflow => {
                let task = e.task.as_deref().unwrap_or("-");
                warn!(target: "spacevisor", seq = e.seq, task, tick = e.tick, reason, "{label}");
            }
            EventKind::ListenerStarted
            | EventKind::ListenerStopped
            | EventKind::ArbiterStarted
            | EventKind::ArbiterStopped
            | EventKind::ShutdownRequested => {
                let site = e.site.as_deref().unwrap_or("-");
                debug!(target: "spacevisor", seq = e.seq, site, fleet, reason, "{label}");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
