//! Data model shared by the store, the adapters and the arbiter.
//!
//! - [`SharedSpace`] / [`SpaceState`] a contested region and its occupancy flag
//! - [`QueueRecord`] / [`OrderKey`] a request or lock entry in the priority queue

mod record;
mod space;

pub use record::{OrderKey, QueueRecord, LOCK_ORDER_KEY};
pub use space::{SharedSpace, SpaceState};
