//! # Task specification for periodic execution.
//!
//! [`TaskSpec`] bundles a task with its cadence, an optional per-tick timeout and the
//! jitter applied to its first tick. A spec is handed to
//! [`spawn_periodic`](crate::spawn_periodic).

use std::time::Duration;

use crate::{config::Config, policies::JitterPolicy, tasks::task::TaskRef};

/// Specification for running a task every `period`.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
/// use spacevisor::{Config, TaskError, TaskFn, TaskRef, TaskSpec};
///
/// let poll: TaskRef = TaskFn::arc("poll", |_ctx: CancellationToken| async move {
///     Ok::<(), TaskError>(())
/// });
///
/// let spec = TaskSpec::new(poll.clone(), Duration::from_millis(500));
/// assert!(spec.timeout().is_none());
///
/// let cfg = Config::default();
/// let spec = TaskSpec::with_defaults(poll, cfg.request_poll, &cfg);
/// assert_eq!(spec.period(), cfg.request_poll);
/// ```
#[derive(Clone)]
pub struct TaskSpec {
    task: TaskRef,
    period: Duration,
    timeout: Option<Duration>,
    jitter: JitterPolicy,
}

impl TaskSpec {
    /// A spec without timeout or jitter. A zero period is clamped to 1ms.
    pub fn new(task: TaskRef, period: Duration) -> Self {
        Self {
            task,
            period: period.max(Duration::from_millis(1)),
            timeout: None,
            jitter: JitterPolicy::None,
        }
    }

    /// A spec inheriting tick timeout and start jitter from `cfg`.
    pub fn with_defaults(task: TaskRef, period: Duration, cfg: &Config) -> Self {
        Self::new(task, period)
            .with_timeout(cfg.tick_timeout())
            .with_jitter(cfg.start_jitter)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|d| *d > Duration::ZERO);
        self
    }

    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn jitter(&self) -> JitterPolicy {
        self.jitter
    }
}
