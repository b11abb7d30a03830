//! Fleet adapters: from vendor telemetry to shared-space events and back.
//!
//! - [`VendorClient`] the narrow vendor surface (telemetry, outlines, access primitive)
//! - [`FleetAdapter`] the uniform adapter interface the arbiter talks to
//! - [`FleetConnector`] the generic adapter event loop over any vendor
//! - [`SpatialTracker`] adapter-local robot state shared by its ticks
//! - [`Dispatcher`] ordered async handlers per [`FleetEventKind`]
//! - [`SimulatedFleet`] a scriptable in-memory vendor

mod adapter;
mod connector;
mod dispatch;
mod event;
mod sim;
mod tracker;
mod vendor;

pub use adapter::{AdapterRef, FleetAdapter, GrantOutcome};
pub use connector::FleetConnector;
pub use dispatch::{fallible_handler, handler, Dispatcher, Handler, HandlerId};
pub use event::{AccessRequest, FleetEvent, FleetEventKind, GrantFailed, Release};
pub use sim::{SimulatedFleet, VendorCommand};
pub use tracker::{Containment, HeldLock, RobotSpatialState, SpatialTracker};
pub use vendor::{AccessControl, LocationStatus, RobotState, RobotStatus, VendorClient};
