use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::dispatch::{Handler, HandlerId};
use super::event::FleetEventKind;
use crate::error::RuntimeError;

/// Shared handle to a fleet adapter.
pub type AdapterRef = Arc<dyn FleetAdapter>;

/// Result of [`FleetAdapter::grant_access`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// The vendor command succeeded and the robot is now tracked as lock holder.
    Granted,
    /// The robot already held the space; nothing was sent.
    AlreadyHeld,
    /// The vendor command failed; a `GrantFailed` event was emitted.
    Failed,
}

/// # Uniform bridge between one vendor fleet and the arbiter.
///
/// An adapter detects waiting robots next to shared spaces (emitting
/// [`FleetEventKind::Request`]), detects lock holders leaving them
/// ([`FleetEventKind::Release`]), and unblocks robots on command.
///
/// Faults inside the adapter never surface through these methods; only the listener
/// invariants (`start` twice, `stop` without `start`) do.
#[async_trait]
pub trait FleetAdapter: Send + Sync + 'static {
    fn fleet_id(&self) -> &str;

    /// Starts request and exit detection, polling every `poll`.
    fn start_shared_space_listener(&self, poll: Duration) -> Result<(), RuntimeError>;

    /// Stops both detections. A tick already running completes.
    fn stop_shared_space_listener(&self) -> Result<(), RuntimeError>;

    fn is_listening(&self) -> bool;

    /// Unblocks `robot` for `space`. Idempotent per robot and space.
    async fn grant_access(&self, robot: &str, space: &str) -> GrantOutcome;

    /// Registers `handler` for `kind`, after any handlers already registered.
    fn on_event(&self, kind: FleetEventKind, handler: Handler) -> HandlerId;

    /// Unregisters a handler; `false` if it was not registered.
    fn off(&self, kind: FleetEventKind, id: HandlerId) -> bool;
}
