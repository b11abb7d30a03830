//! # spacevisor
//!
//! **Spacevisor** arbitrates physical access to shared spaces: map regions that robots of
//! several independently controlled fleets must cross but may never occupy at the same
//! time (fire doors, narrow aisles, elevators).
//!
//! Each fleet is bridged by a [`FleetAdapter`] that turns polled telemetry into
//! *request* and *release* events. A site-wide [`Arbiter`] serializes access through a
//! persistent priority queue ([`QueueStore`]) whose atomic promotion is the only
//! cross-component guarantee: at most one lock per space, whatever the interleaving.
//!
//! ## Architecture
//! ```text
//!   vendor A             vendor B
//!      │ telemetry          │ telemetry
//!      ▼                    ▼
//! ┌──────────────┐   ┌──────────────┐   two tickers each:
//! │FleetConnector│   │FleetConnector│     request detection (waiting + approaching)
//! │   (fleet A)  │   │   (fleet B)  │     exit detection    (holder left the polygon)
//! └──┬────────▲──┘   └──┬────────▲──┘
//!    │Request │grant    │Request │grant
//!    │Release │access   │Release │access
//!    ▼        │         ▼        │
//! ┌─────────────────────────────────────┐
//! │ Arbiter (one ticker per site)       │
//! │  on_access_request → insert         │
//! │  on_release        → delete lock    │
//! │  on_grant_failed   → revert lock    │
//! │  tick: promote next / report overdue│
//! └─────────────────┬───────────────────┘
//!                   ▼
//!        ┌─────────────────────┐
//!        │ QueueStore          │  MemoryQueueStore, SqliteQueueStore
//!        │ (space, order key)  │  LOCK sorts after every request
//!        └─────────────────────┘
//!
//! every component ──publish──► Bus ──► SubscriberSet ──► LogWriter / custom
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                          |
//! |-------------------|----------------------------------------------------------|---------------------------------------------|
//! | **Geometry**      | Polygons, containment, distance, proximity.              | [`geometry::Polygon`], [`geometry::Point`]  |
//! | **Queue store**   | Partitioned request/lock table with atomic promotion.    | [`QueueStore`], [`QueueRecord`]             |
//! | **Fleet adapters**| Vendor telemetry to request/release events and grants.   | [`FleetAdapter`], [`FleetConnector`]        |
//! | **Arbitration**   | Ordering, promotion, timeouts, release checks.           | [`Arbiter`]                                 |
//! | **Runtime**       | Periodic tickers, site wiring, signal handling.          | [`Site`], [`SiteBuilder`], [`TaskSpec`]     |
//! | **Observability** | Typed events and subscriber fan-out.                     | [`Event`], [`Subscribe`]                    |
//! | **Errors**        | Lifecycle errors for callers, absorbed errors as events. | [`RuntimeError`], [`StoreError`]            |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], forwarding every event to `tracing`.
//! - `sqlite` (default): exports [`SqliteQueueStore`], a persistent `rusqlite` backend.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use spacevisor::{
//!     AccessControl, Config, RobotState, SimulatedFleet, SiteBuilder, SiteConfig,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), spacevisor::RuntimeError> {
//!     let site = SiteConfig::from_json(r#"{
//!         "site": "dc-east",
//!         "spaces": [{ "id": "fire-door-3", "ownerFleet": "amr" }]
//!     }"#)?;
//!
//!     let amr = Arc::new(
//!         SimulatedFleet::new(AccessControl::ExclusionZone)
//!             .with_space("fire-door-3", &[(0.0, 0.0), (0.0, 4.0), (2.0, 4.0), (2.0, 0.0)])
//!             .with_robot("amr-17", (3.0, 2.0), RobotState::Waiting),
//!     );
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn spacevisor::Subscribe>> = vec![Arc::new(spacevisor::LogWriter)];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn spacevisor::Subscribe>> = Vec::new();
//!
//!     let site = SiteBuilder::new(Config::default(), site)?
//!         .with_vendor("amr", amr)
//!         .with_subscribers(subs)
//!         .build();
//!
//!     site.start()?;
//!     // ... or `site.run().await?` to serve until SIGINT/SIGTERM
//!     site.stop()?;
//!     Ok(())
//! }
//! ```
mod arbiter;
mod clock;
mod config;
mod core;
mod error;
mod events;
mod fleet;
pub mod geometry;
mod model;
mod policies;
mod site;
mod store;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use arbiter::Arbiter;
pub use clock::{Clock, ClockRef, EpochMillis, ManualClock, SystemClock};
pub use config::{Config, SiteConfig, SpaceConfig, REENTRY_RADIUS};
pub use crate::core::{spawn_periodic, wait_for_shutdown_signal, ShutdownSignal, TickerHandle};
pub use error::{
    ConfigError, GeometryError, HandlerError, RuntimeError, StoreError, TaskError, VendorError,
};
pub use events::{Bus, Event, EventKind};
pub use fleet::{
    fallible_handler, handler, AccessControl, AccessRequest, AdapterRef, Containment,
    Dispatcher, FleetAdapter, FleetConnector, FleetEvent, FleetEventKind, GrantFailed,
    GrantOutcome, Handler, HandlerId, HeldLock, LocationStatus, Release, RobotSpatialState,
    RobotState, RobotStatus, SimulatedFleet, SpatialTracker, VendorClient, VendorCommand,
};
pub use model::{OrderKey, QueueRecord, SharedSpace, SpaceState, LOCK_ORDER_KEY};
pub use policies::JitterPolicy;
pub use site::{Site, SiteBuilder};
pub use store::{Enqueued, MemoryQueueStore, QueueStore, StoreRef};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{Task, TaskFn, TaskRef, TaskSpec};

// Persistent SQLite backend.
// Disable with: `--no-default-features --features logging`
#[cfg(feature = "sqlite")]
pub use store::SqliteQueueStore;

// Built-in `tracing` subscriber.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
