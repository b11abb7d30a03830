//! # Wall-clock source shared by stores, adapters and the arbiter.
//!
//! Fleets share no clock with each other; the arbitration engine only trusts its own.
//! All timestamps are epoch milliseconds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Epoch milliseconds.
pub type EpochMillis = u64;

/// Source of the current time.
pub trait Clock: Send + Sync + 'static {
    /// Current time as epoch milliseconds.
    fn now_millis(&self) -> EpochMillis;

    /// Current time as epoch seconds (used for record expiry).
    fn now_secs(&self) -> u64 {
        self.now_millis() / 1000
    }
}

/// Shared handle to a clock.
pub type ClockRef = Arc<dyn Clock>;

/// System wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> EpochMillis {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis().min(u128::from(u64::MAX)) as u64)
            .unwrap_or(0)
    }
}

/// Manually driven clock for tests and simulations.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use spacevisor::{Clock, ManualClock};
///
/// let clock = ManualClock::new(100);
/// clock.advance(Duration::from_millis(50));
/// assert_eq!(clock.now_millis(), 150);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at `now` (epoch millis).
    pub fn new(now: EpochMillis) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    /// Jumps to an absolute time.
    pub fn set(&self, now: EpochMillis) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Moves time forward.
    pub fn advance(&self, by: Duration) {
        let ms = by.as_millis().min(u128::from(u64::MAX)) as u64;
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> EpochMillis {
        self.now.load(Ordering::SeqCst)
    }
}

/// Converts a duration to whole milliseconds, saturating.
#[inline]
pub(crate) fn millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}
