//! # Event subscribers.
//!
//! ```text
//!   FleetConnector ─┐
//!   Arbiter ────────┼── publish(Event) ──► Bus ──► Site listener ──► SubscriberSet
//!   Tickers ────────┘                                                  │
//!                                                   ┌─────────────┬────┴──────┐
//!                                                   ▼             ▼           ▼
//!                                               LogWriter    audit trail   custom
//! ```
//!
//! Implement [`Subscribe`] for custom sinks; [`LogWriter`] (feature `logging`) forwards
//! everything to `tracing`.

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
