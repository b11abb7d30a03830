use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Shared handle to a task object.
pub type TaskRef = Arc<dyn Task>;

/// # One tick of periodic work.
///
/// `run` is invoked once per period by a ticker and always runs to completion; the
/// token only tells the task that no further ticks will follow, so long loops inside a
/// tick may bail out early.
///
/// # Example
/// ```
/// use tokio_util::sync::CancellationToken;
/// use async_trait::async_trait;
/// use spacevisor::{Task, TaskError};
///
/// struct Heartbeat;
///
/// #[async_trait]
/// impl Task for Heartbeat {
///     fn name(&self) -> &str { "heartbeat" }
///
///     async fn run(&self, _ctx: CancellationToken) -> Result<(), TaskError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Stable name used in events.
    fn name(&self) -> &str;

    /// Executes one tick.
    async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError>;
}
