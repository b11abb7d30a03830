//! # Periodic ticker.
//!
//! [`spawn_periodic`] runs a [`TaskSpec`]'s task once per period on its own tokio task.
//!
//! - The first tick fires one period (plus jitter) after spawning, never immediately.
//! - Ticks never overlap: a slow tick delays the next one ([`MissedTickBehavior::Delay`]).
//! - [`TickerHandle::stop`] prevents further ticks; a tick already running completes.
//!
//! ```text
//! spawn_periodic(spec, bus)
//!   └─► tokio::spawn(loop {
//!         select! {
//!           token.cancelled() → break
//!           interval.tick()   → run_once(task, timeout, n)
//!         }
//!       })
//! ```

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::runner::run_once;
use crate::{events::Bus, tasks::TaskSpec};

/// Handle to a running ticker.
///
/// Dropping the handle does not stop the ticker; call [`TickerHandle::stop`].
#[derive(Debug)]
pub struct TickerHandle {
    name: String,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl TickerHandle {
    /// Name of the ticked task.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requests the ticker to stop. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stops the ticker and waits until its in-flight tick (if any) has finished.
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.join.await;
    }
}

/// Spawns a ticker for `spec`, publishing tick failures to `bus`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_periodic(spec: TaskSpec, bus: Bus) -> TickerHandle {
    let token = CancellationToken::new();
    let name = spec.task().name().to_string();

    let period = spec.period();
    let first = Instant::now() + period + spec.jitter().offset(period);

    let loop_token = token.clone();
    let join = tokio::spawn(async move {
        let mut interval = time::interval_at(first, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tick: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = loop_token.cancelled() => break,
                _ = interval.tick() => {}
            }
            tick += 1;
            let _ = run_once(spec.task().as_ref(), &loop_token, spec.timeout(), tick, &bus).await;
        }
    });

    TickerHandle { name, token, join }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::error::TaskError;
    use crate::tasks::{TaskFn, TaskRef};

    fn counting(counter: Arc<AtomicU32>) -> TaskRef {
        TaskFn::arc("count", move |_ctx: CancellationToken| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), TaskError>(())
            }
        })
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_one_period() {
        let counter = Arc::new(AtomicU32::new(0));
        let handle = spawn_periodic(
            TaskSpec::new(counting(counter.clone()), Duration::from_millis(100)),
            Bus::new(8),
        );

        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        for _ in 0..2 {
            time::advance(Duration::from_millis(100)).await;
            settle().await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_further_ticks() {
        let counter = Arc::new(AtomicU32::new(0));
        let handle = spawn_periodic(
            TaskSpec::new(counting(counter.clone()), Duration::from_millis(50)),
            Bus::new(8),
        );

        time::advance(Duration::from_millis(50)).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        time::advance(Duration::from_millis(500)).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_tick_completes_after_stop() {
        let done = Arc::new(AtomicU32::new(0));
        let d = done.clone();
        let slow: TaskRef = TaskFn::arc("slow", move |_ctx: CancellationToken| {
            let d = d.clone();
            async move {
                time::sleep(Duration::from_millis(200)).await;
                d.fetch_add(1, Ordering::SeqCst);
                Ok::<(), TaskError>(())
            }
        });
        let handle = spawn_periodic(TaskSpec::new(slow, Duration::from_millis(10)), Bus::new(8));

        time::advance(Duration::from_millis(10)).await;
        settle().await;
        handle.stop();
        handle.shutdown().await;

        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
