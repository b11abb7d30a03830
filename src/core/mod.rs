//! Runtime core: periodic execution and shutdown.
//!
//! Internal modules:
//! - [`runner`]: executes one tick with timeout and event publishing;
//! - [`ticker`]: runs a task once per period until stopped;
//! - [`shutdown`]: cross-platform shutdown signal handling.
//!
//! ## Wiring
//! ```text
//! FleetConnector ──► spawn_periodic(request spec) ──┐
//!                ──► spawn_periodic(exit spec) ─────┤   each: loop {
//! Arbiter ───────► spawn_periodic(arbiter spec) ────┘     wait period (cancellable)
//!                                                         run_once(task)  (never interrupted)
//!                                                       }
//! ```

mod runner;
mod shutdown;
mod ticker;

pub use shutdown::{wait_for_shutdown_signal, ShutdownSignal};
pub use ticker::{spawn_periodic, TickerHandle};
