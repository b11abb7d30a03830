//! Scheduling policies.
//!
//! ## Contents
//! - [`JitterPolicy`] randomizes the phase of a ticker's first tick so that adapters
//!   configured with the same cadence do not poll their vendors in lockstep.
//!
//! ## Quick wiring
//! ```text
//! TaskSpec { period, timeout, jitter }
//!      └─► core::ticker::spawn_periodic:
//!           - first tick after period + jitter.offset(period)
//!           - then every period
//! ```

mod jitter;

pub use jitter::JitterPolicy;
