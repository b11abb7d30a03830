//! # Phase jitter for periodic ticks.
//!
//! - [`JitterPolicy::None`]: no offset, every ticker starts exactly one period in
//! - [`JitterPolicy::Full`]: offset in [0, period]
//! - [`JitterPolicy::Equal`]: offset in [period/2, period]

use rand::Rng;
use std::time::Duration;

/// Randomization of the first-tick phase.
///
/// ## Trade-offs
/// - **None**: predictable, every poller on the same cadence fires together
/// - **Full**: widest spread
/// - **Equal**: spread while keeping at least half a period of warm-up
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JitterPolicy {
    /// No offset. Use in tests and single-fleet sites.
    #[default]
    None,
    /// Offset drawn from [0, period].
    Full,
    /// Offset drawn from [period/2, period].
    Equal,
}

impl JitterPolicy {
    /// Offset to add before the first tick of a ticker running every `period`.
    pub fn offset(&self, period: Duration) -> Duration {
        let ms = period.as_millis().min(u128::from(u64::MAX)) as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::rng();
        match self {
            JitterPolicy::None => Duration::ZERO,
            JitterPolicy::Full => Duration::from_millis(rng.random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                Duration::from_millis(half + rng.random_range(0..=ms - half))
            }
        }
    }
}
