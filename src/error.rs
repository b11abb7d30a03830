//! Error types used by the arbitration runtime, its stores and its fleet adapters.
//!
//! - [`RuntimeError`]: lifecycle invariant violations surfaced to `start`/`stop` callers.
//! - [`TaskError`]: failures of a single periodic tick.
//! - [`StoreError`]: priority queue backend failures and lost conditional writes.
//! - [`VendorError`]: vendor telemetry/command failures (transient by nature).
//! - [`HandlerError`]: a fleet event handler could not apply an event; the adapter retries.
//! - [`GeometryError`]: polygons that cannot bound a region.
//! - [`ConfigError`]: malformed site configuration.
//!
//! Every enum provides `as_label` (stable snake_case, for logs/metrics) and `as_message`.
//! Only [`RuntimeError`] ever reaches a caller; everything else is absorbed where it
//! happens and reported on the event bus.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the runtime lifecycle.
///
/// These are programming errors: they fail fast and are never retried.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// `start_shared_space_listener` called twice without an intervening stop.
    #[error("shared space listener for fleet '{fleet}' is already running")]
    ListenerAlreadyRunning {
        /// Fleet whose listener is running.
        fleet: String,
    },

    /// `stop_shared_space_listener` called while no listener was running.
    #[error("shared space listener for fleet '{fleet}' is not running")]
    ListenerNotRunning {
        /// Fleet without a listener.
        fleet: String,
    },

    /// `Arbiter::start` called while the arbiter is already running.
    #[error("arbiter for site '{site}' is already started")]
    ArbiterAlreadyStarted {
        /// Site served by the arbiter.
        site: String,
    },

    /// `Arbiter::stop` called before `start` ever succeeded.
    ///
    /// Teardown needs the adapter set captured at start, so this is unrecoverable.
    #[error("arbiter for site '{site}' was never started; nothing to tear down")]
    ArbiterNotStarted {
        /// Site served by the arbiter.
        site: String,
    },

    /// Site configuration rejected while building the runtime.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use spacevisor::RuntimeError;
    ///
    /// let err = RuntimeError::ListenerNotRunning { fleet: "amr".into() };
    /// assert_eq!(err.as_label(), "listener_not_running");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::ListenerAlreadyRunning { .. } => "listener_already_running",
            RuntimeError::ListenerNotRunning { .. } => "listener_not_running",
            RuntimeError::ArbiterAlreadyStarted { .. } => "arbiter_already_started",
            RuntimeError::ArbiterNotStarted { .. } => "arbiter_not_started",
            RuntimeError::Config(_) => "config_invalid",
        }
    }

    /// Returns a compact human-readable message for event reasons.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::ListenerAlreadyRunning { fleet } => format!("listener {fleet} already running"),
            RuntimeError::ListenerNotRunning { fleet } => format!("listener {fleet} not running"),
            RuntimeError::ArbiterAlreadyStarted { site } => format!("arbiter {site} already started"),
            RuntimeError::ArbiterNotStarted { site } => format!("arbiter {site} never started"),
            RuntimeError::Config(e) => e.as_message(),
        }
    }

    /// True when the condition cannot be recovered by the caller retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RuntimeError::ArbiterNotStarted { .. } | RuntimeError::Config(_)
        )
    }
}

/// # Errors produced by a single periodic tick.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The tick exceeded its configured timeout; it was cancelled and ran to completion.
    #[error("tick timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// The tick failed; the next tick runs on schedule.
    #[error("tick failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The tick observed cancellation and exited early.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Timeout { .. } => "tick_timeout",
            TaskError::Fail { .. } => "tick_failed",
            TaskError::Canceled => "tick_canceled",
        }
    }

    /// Returns a compact human-readable message for event reasons.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Timeout { timeout } => format!("timeout: {timeout:?}"),
            TaskError::Fail { error } => format!("error: {error}"),
            TaskError::Canceled => "context cancelled".to_string(),
        }
    }
}

/// # Errors produced by a priority queue store.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A conditional write lost: the lock already exists, or the source record is gone.
    #[error("conditional write rejected for space '{space}': {reason}")]
    ConditionFailed {
        /// Shared space whose partition was targeted.
        space: String,
        /// Which condition did not hold.
        reason: &'static str,
    },

    /// The backend failed (I/O, SQL, poisoned lock).
    #[error("store backend failure: {0}")]
    Backend(String),

    /// A persisted row could not be decoded into a record.
    #[error("corrupt queue record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::ConditionFailed { .. } => "store_condition_failed",
            StoreError::Backend(_) => "store_backend",
            StoreError::Corrupt(_) => "store_corrupt",
        }
    }

    /// Returns a compact human-readable message for event reasons.
    pub fn as_message(&self) -> String {
        match self {
            StoreError::ConditionFailed { reason, .. } => format!("condition failed: {reason}"),
            StoreError::Backend(e) => format!("backend: {e}"),
            StoreError::Corrupt(e) => format!("corrupt: {e}"),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// # Errors produced by a vendor fleet manager.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VendorError {
    /// The call did not complete within the network timeout.
    #[error("vendor call '{call}' timed out after {after:?}")]
    Timeout {
        /// Which call timed out.
        call: &'static str,
        /// The timeout that was exceeded.
        after: Duration,
    },

    /// The vendor rejected or failed the call.
    #[error("vendor call failed: {0}")]
    Command(String),

    /// The vendor does not expose the requested primitive.
    #[error("vendor does not support '{0}'")]
    Unsupported(&'static str),

    /// The vendor does not know the robot.
    #[error("unknown robot '{0}'")]
    UnknownRobot(String),
}

impl VendorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            VendorError::Timeout { .. } => "vendor_timeout",
            VendorError::Command(_) => "vendor_command",
            VendorError::Unsupported(_) => "vendor_unsupported",
            VendorError::UnknownRobot(_) => "vendor_unknown_robot",
        }
    }

    /// Returns a compact human-readable message for event reasons.
    pub fn as_message(&self) -> String {
        match self {
            VendorError::Timeout { call, after } => format!("{call} timed out after {after:?}"),
            VendorError::Command(e) => format!("command failed: {e}"),
            VendorError::Unsupported(what) => format!("unsupported: {what}"),
            VendorError::UnknownRobot(r) => format!("unknown robot {r}"),
        }
    }
}

/// # Errors returned by fleet event handlers.
///
/// An adapter that sees one keeps the underlying observation and emits it again on a
/// later tick.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The queue store failed while applying the event.
    #[error("handler store failure: {0}")]
    Store(#[from] StoreError),

    /// The event could not be applied for another reason.
    #[error("handler rejected event: {0}")]
    Rejected(String),
}

impl HandlerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Store(_) => "handler_store",
            HandlerError::Rejected(_) => "handler_rejected",
        }
    }

    /// Returns a compact human-readable message for event reasons.
    pub fn as_message(&self) -> String {
        match self {
            HandlerError::Store(e) => e.as_message(),
            HandlerError::Rejected(e) => format!("rejected: {e}"),
        }
    }
}

/// # Errors produced while building geometry.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    /// Fewer than three distinct vertices; the ring cannot bound a region.
    #[error("polygon needs at least 3 distinct points, got {distinct}")]
    InsufficientPoints {
        /// Number of distinct points supplied.
        distinct: usize,
    },
}

impl GeometryError {
    pub fn as_label(&self) -> &'static str {
        match self {
            GeometryError::InsufficientPoints { .. } => "geometry_insufficient_points",
        }
    }

    pub fn as_message(&self) -> String {
        match self {
            GeometryError::InsufficientPoints { distinct } => {
                format!("insufficient points: {distinct} distinct")
            }
        }
    }
}

/// # Errors produced while loading site configuration.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The document could not be parsed.
    #[error("site config parse error: {0}")]
    Parse(String),

    /// The document parsed but violates a constraint.
    #[error("site config rejected: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Invalid(_) => "config_rejected",
        }
    }

    pub fn as_message(&self) -> String {
        match self {
            ConfigError::Parse(e) => format!("parse: {e}"),
            ConfigError::Invalid(e) => format!("rejected: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        let err = RuntimeError::ArbiterNotStarted { site: "s".into() };
        assert_eq!(err.as_label(), "arbiter_not_started");
        assert!(err.is_fatal());

        let err = RuntimeError::ListenerAlreadyRunning { fleet: "f".into() };
        assert!(!err.is_fatal());

        let err = StoreError::ConditionFailed {
            space: "s".into(),
            reason: "lock_exists",
        };
        assert_eq!(err.as_label(), "store_condition_failed");
        assert!(err.to_string().contains("lock_exists"));

        let err = VendorError::Timeout {
            call: "robot_status",
            after: Duration::from_secs(5),
        };
        assert_eq!(err.as_label(), "vendor_timeout");

        let err: HandlerError = StoreError::Backend("disk full".into()).into();
        assert_eq!(err.as_label(), "handler_store");
        assert_eq!(err.as_message(), "backend: disk full");
    }

    #[test]
    fn config_error_converts_into_runtime_error() {
        let err: RuntimeError = ConfigError::Invalid("no spaces".into()).into();
        assert_eq!(err.as_label(), "config_invalid");
        assert_eq!(err.as_message(), "rejected: no spaces");
        assert!(err.is_fatal());
    }
}
