//! # Event subscriber trait.
//!
//! [`Subscribe`] is the extension point for observing a site: audit trails, dashboards,
//! alerting on `CrossingTimeout`, and so on.
//!
//! Each subscriber gets a dedicated worker task fed by its own bounded queue; a panic
//! inside [`Subscribe::on_event`] is caught and published as `SubscriberPanicked`.
//!
//! ```text
//! SubscriberSet ──► [bounded queue] ──► worker ──► subscriber.on_event()
//!                                            └─► panic caught → SubscriberPanicked
//! ```
//!
//! A full queue drops the event for that subscriber only and publishes
//! `SubscriberOverflow`.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use spacevisor::{Event, EventKind, Subscribe};
//!
//! struct OverdueAlarm;
//!
//! #[async_trait]
//! impl Subscribe for OverdueAlarm {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::CrossingTimeout {
//!             // page the site operator
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "overdue-alarm" }
//!     fn queue_capacity(&self) -> usize { 64 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber.
///
/// Handle errors internally and avoid blocking the executor; slow processing only
/// affects this subscriber's queue.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, in FIFO order per subscriber.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic events.
    ///
    /// Defaults to `type_name::<Self>()`.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue capacity, clamped to at least 1. Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
