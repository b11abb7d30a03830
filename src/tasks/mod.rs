//! # Periodic work units.
//!
//! - [`Task`] - trait for one async, cancelable tick of work
//! - [`TaskFn`] - closure-backed implementation
//! - [`TaskRef`] - shared handle (`Arc<dyn Task>`)
//! - [`TaskSpec`] - a task plus its cadence, timeout and start jitter

mod spec;
mod task;
mod task_fn;

pub use spec::TaskSpec;
pub use task::{Task, TaskRef};
pub use task_fn::TaskFn;
