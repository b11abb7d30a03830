//! # Run a single tick.
//!
//! ```text
//! Success:   task.run() → Ok(())           → (no event)
//! Cancelled: task.run() → Err(Canceled)    → (no event)
//! Failure:   task.run() → Err(Fail)        → publish TickFailed
//! Overrun:   timeout exceeded → cancel child → publish TickTimeout
//!                             → wait for the tick to finish → Err(Timeout)
//! ```
//!
//! Each tick gets a child token of the ticker's token; a timeout cancels only the child.
//! An overrunning tick is never dropped mid-flight: a tick may sit between two writes
//! that belong together (a promoted lock and its grant command), so it always runs to
//! completion and the next tick waits for it.

use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::{
    error::TaskError,
    events::{Bus, Event, EventKind},
    tasks::Task,
};

/// Executes tick number `tick` of `task`, publishing failures to `bus`.
pub(crate) async fn run_once<T: Task + ?Sized>(
    task: &T,
    parent: &CancellationToken,
    timeout: Option<Duration>,
    tick: u64,
    bus: &Bus,
) -> Result<(), TaskError> {
    let child = parent.child_token();
    let run = task.run(child.clone());
    tokio::pin!(run);

    let res = match timeout.filter(|d| *d > Duration::ZERO) {
        Some(dur) => {
            tokio::select! {
                res = &mut run => res,
                _ = time::sleep(dur) => {
                    child.cancel();
                    let err = TaskError::Timeout { timeout: dur };
                    bus.publish(
                        Event::new(EventKind::TickTimeout)
                            .with_task(task.name())
                            .with_tick(tick)
                            .with_reason(err.to_string()),
                    );
                    let _ = run.await;
                    return Err(err);
                }
            }
        }
        None => run.await,
    };

    if let Err(e @ TaskError::Fail { .. }) = &res {
        bus.publish(
            Event::new(EventKind::TickFailed)
                .with_task(task.name())
                .with_tick(tick)
                .with_reason(e.to_string()),
        );
    }
    res
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::tasks::TaskFn;

    #[tokio::test(start_paused = true)]
    async fn cooperative_tick_stops_on_overrun() {
        let bus = Bus::new(8);
        let polite = TaskFn::new("polite", |ctx: CancellationToken| async move {
            tokio::select! {
                _ = ctx.cancelled() => Err(TaskError::Canceled),
                _ = time::sleep(Duration::from_secs(60)) => Ok(()),
            }
        });
        let started = time::Instant::now();
        let res = run_once(
            &polite,
            &CancellationToken::new(),
            Some(Duration::from_secs(1)),
            1,
            &bus,
        )
        .await;
        assert!(matches!(res, Err(TaskError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_tick_is_reported_and_finishes() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let finished = Arc::new(AtomicBool::new(false));
        let done = finished.clone();
        let slow = TaskFn::new("slow", move |_ctx: CancellationToken| {
            let done = done.clone();
            async move {
                time::sleep(Duration::from_secs(10)).await;
                done.store(true, Ordering::SeqCst);
                Ok(())
            }
        });
        let started = time::Instant::now();

        let res = run_once(
            &slow,
            &CancellationToken::new(),
            Some(Duration::from_secs(1)),
            7,
            &bus,
        )
        .await;
        assert_eq!(
            res,
            Err(TaskError::Timeout {
                timeout: Duration::from_secs(1)
            })
        );
        assert!(finished.load(Ordering::SeqCst));
        assert!(started.elapsed() >= Duration::from_secs(10));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::TickTimeout);
        assert_eq!(ev.tick, Some(7));
        assert_eq!(ev.task.as_deref(), Some("slow"));
    }

    #[tokio::test]
    async fn failures_are_published_cancellation_is_not() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let failing = TaskFn::new("failing", |_ctx: CancellationToken| async move {
            Err(TaskError::Fail {
                error: "vendor down".into(),
            })
        });
        let canceled = TaskFn::new("canceled", |_ctx: CancellationToken| async move {
            Err(TaskError::Canceled)
        });

        let token = CancellationToken::new();
        assert!(run_once(&failing, &token, None, 1, &bus).await.is_err());
        assert!(run_once(&canceled, &token, None, 1, &bus).await.is_err());

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::TickFailed);
        assert!(ev.reason.as_deref().unwrap().contains("vendor down"));
        assert!(rx.try_recv().is_err());
    }
}
