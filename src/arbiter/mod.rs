//! # Site-wide arbitration.
//!
//! [`Arbiter`] decides which robot may enter each shared space of a site. It owns no
//! lock state of its own: every decision reads the [`QueueStore`](crate::QueueStore)
//! and every transition is a store write, so several arbiters sharing one store still
//! hold at most one lock per space.
//!
//! Per-space lifecycle, derived from the store:
//!
//! ```text
//!   FREE ──(tick: promote next request)──► LOCKED ──(release by holder)──► FREE
//!                                           │  ▲
//!                  (grant failed: revert)   │  │ (tick: deadline passed →
//!   FREE ◄──────────────────────────────────┘  │  CrossingTimeout, lock kept)
//!                                              └──
//! ```

mod engine;

pub use engine::Arbiter;
