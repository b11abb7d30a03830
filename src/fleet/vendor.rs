//! # Vendor command surface.
//!
//! [`VendorClient`] is the narrow interface a fleet manager integration implements: robot
//! telemetry, the space outline in the fleet's own coordinates, and one of two access
//! primitives:
//!
//! - [`AccessControl::ExclusionZone`]: the vendor can block/unblock a zone physically.
//! - [`AccessControl::LocationTag`]: no blocking primitive; a status tag on the robot's
//!   record tells its own planner whether it may proceed.
//!
//! Every call made through [`call`] is bounded by the configured vendor timeout.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VendorError;
use crate::geometry::Point;

/// Motion state as reported by the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RobotState {
    Idle,
    Moving,
    /// Stopped by the vendor in front of a blocked zone.
    Waiting,
    /// Stopped for any other reason (obstacle, e-stop).
    Blocked,
    Error,
}

impl RobotState {
    /// True when the robot is held up and may be queued at a space.
    pub fn is_waiting(self) -> bool {
        matches!(self, RobotState::Waiting | RobotState::Blocked)
    }
}

/// One telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobotStatus {
    pub position: Point,
    pub state: RobotState,
}

impl RobotStatus {
    pub fn new(x: f64, y: f64, state: RobotState) -> Self {
        Self {
            position: Point::new(x, y),
            state,
        }
    }
}

/// Access primitive a vendor offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessControl {
    ExclusionZone,
    LocationTag,
}

/// Out-of-band location tag for fleets without a blocking primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationStatus {
    WaitingForSpace,
    InSpace,
    OutOfSpace,
}

impl LocationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LocationStatus::WaitingForSpace => "WAITING_FOR_SPACE",
            LocationStatus::InSpace => "IN_SPACE",
            LocationStatus::OutOfSpace => "OUT_OF_SPACE",
        }
    }
}

/// A vendor fleet manager.
///
/// Only the primitive matching [`access_control`](VendorClient::access_control) has to be
/// implemented; the other keeps its `Unsupported` default.
#[async_trait]
pub trait VendorClient: Send + Sync + 'static {
    fn access_control(&self) -> AccessControl;

    /// Ids of every robot in the fleet.
    async fn robots(&self) -> Result<Vec<String>, VendorError>;

    async fn robot_status(&self, robot: &str) -> Result<RobotStatus, VendorError>;

    /// Ordered outline of `space` in this fleet's frame; empty when not mapped yet.
    async fn shared_space_polygon(&self, space: &str) -> Result<Vec<Point>, VendorError>;

    async fn set_space_blocked(&self, _space: &str, _blocked: bool) -> Result<(), VendorError> {
        Err(VendorError::Unsupported("set_space_blocked"))
    }

    async fn set_location_status(
        &self,
        _robot: &str,
        _status: LocationStatus,
    ) -> Result<(), VendorError> {
        Err(VendorError::Unsupported("set_location_status"))
    }

    async fn location_status(&self, _robot: &str) -> Result<Option<LocationStatus>, VendorError> {
        Err(VendorError::Unsupported("location_status"))
    }
}

/// Runs one vendor call under `after`; an elapsed timeout becomes [`VendorError::Timeout`].
pub(crate) async fn call<T, F>(name: &'static str, after: Duration, fut: F) -> Result<T, VendorError>
where
    F: Future<Output = Result<T, VendorError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(res) => res,
        Err(_elapsed) => Err(VendorError::Timeout { call: name, after }),
    }
}
