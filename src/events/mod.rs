//! Runtime observability events: types and broadcast bus.
//!
//! Every fault the runtime absorbs (vendor failures, lost store races, release
//! mismatches, crossing timeouts) becomes an [`Event`] on the [`Bus`]; subscribers turn
//! those into logs and metrics.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Arbiter`, `FleetConnector`, tickers (`runner::run_once`),
//!   `SubscriberSet` workers (overflow/panic), `Site` (shutdown).
//! - **Consumers**: `Site`'s listener (fans out to `SubscriberSet`), tests.
//!
//! These are distinct from [`FleetEvent`](crate::fleet::FleetEvent)s, which carry the
//! request/release protocol between adapters and the arbiter.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
