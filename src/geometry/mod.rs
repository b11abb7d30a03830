//! Planar geometry that turns noisy position telemetry into discrete spatial facts.
//!
//! Pure functions only; no state.
//!
//! ## Contents
//! - [`Point`] a 2D position in a fleet's own coordinate frame
//! - [`Polygon`] a closed ring bounding a shared space
//! - [`build_polygon`], [`contains`], [`distance`], [`is_approaching`]
//!
//! ## Quick reference
//! ```text
//!            distance <= threshold
//!        ┌──────────────────────────┐
//!        │   ┌──────────────────┐   │
//!        │   │                  │   │    contains        → INSIDE
//!        │   │      polygon     │ ● │    is_approaching  → APPROACHING
//!        │   │                  │   │    otherwise       → OUTSIDE
//!        │   └──────────────────┘   │
//!        └──────────────────────────┘
//! ```

mod point;
mod polygon;

pub use point::Point;
pub use polygon::{build_polygon, contains, distance, is_approaching, Polygon};

/// Distance (meters) under which a waiting robot outside a space counts as queued at it.
///
/// Chosen empirically: catches robots stopped right at the boundary without
/// triggering on robots merely transiting nearby.
pub const APPROACH_THRESHOLD_M: f64 = 2.0;
