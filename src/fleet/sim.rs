//! # In-memory vendor for tests and demos.
//!
//! [`SimulatedFleet`] keeps robots, space outlines, zone blocks and location tags in
//! memory and records every command it receives. Faults can be injected per call family.
//!
//! ```
//! use spacevisor::{AccessControl, RobotState, SimulatedFleet, VendorCommand};
//!
//! let sim = SimulatedFleet::new(AccessControl::ExclusionZone)
//!     .with_space("door", &[(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)])
//!     .with_robot("amr-1", (11.0, 5.0), RobotState::Waiting);
//!
//! assert_eq!(sim.is_blocked("door"), Some(true));
//! assert!(sim.commands().is_empty());
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::vendor::{AccessControl, LocationStatus, RobotState, RobotStatus, VendorClient};
use crate::error::VendorError;
use crate::geometry::Point;

/// A command the simulator received.
#[derive(Debug, Clone, PartialEq)]
pub enum VendorCommand {
    SetSpaceBlocked { space: String, blocked: bool },
    SetLocationStatus { robot: String, status: LocationStatus },
}

#[derive(Default)]
struct Faults {
    listing: bool,
    commands: bool,
    status: HashSet<String>,
    latency: Option<Duration>,
}

#[derive(Default)]
struct SimState {
    robots: BTreeMap<String, RobotStatus>,
    polygons: HashMap<String, Vec<Point>>,
    blocked: HashMap<String, bool>,
    tags: HashMap<String, LocationStatus>,
    commands: Vec<VendorCommand>,
    faults: Faults,
}

/// Scriptable [`VendorClient`].
pub struct SimulatedFleet {
    access: AccessControl,
    state: Mutex<SimState>,
}

impl SimulatedFleet {
    pub fn new(access: AccessControl) -> Self {
        Self {
            access,
            state: Mutex::new(SimState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declares a space outline; exclusion-zone spaces start blocked.
    pub fn with_space(self, space: &str, outline: &[(f64, f64)]) -> Self {
        {
            let mut s = self.state();
            s.polygons
                .insert(space.to_string(), outline.iter().copied().map(Point::from).collect());
            if self.access == AccessControl::ExclusionZone {
                s.blocked.insert(space.to_string(), true);
            }
        }
        self
    }

    pub fn with_robot(self, robot: &str, at: (f64, f64), state: RobotState) -> Self {
        self.place(robot, at, state);
        self
    }

    /// Adds or moves a robot.
    pub fn place(&self, robot: &str, at: (f64, f64), state: RobotState) {
        self.state().robots.insert(
            robot.to_string(),
            RobotStatus {
                position: Point::from(at),
                state,
            },
        );
    }

    pub fn move_to(&self, robot: &str, at: (f64, f64)) {
        if let Some(r) = self.state().robots.get_mut(robot) {
            r.position = Point::from(at);
        }
    }

    pub fn set_state(&self, robot: &str, state: RobotState) {
        if let Some(r) = self.state().robots.get_mut(robot) {
            r.state = state;
        }
    }

    /// Replaces (or clears, with an empty slice) a space outline.
    pub fn set_outline(&self, space: &str, outline: &[(f64, f64)]) {
        self.state()
            .polygons
            .insert(space.to_string(), outline.iter().copied().map(Point::from).collect());
    }

    /// Makes `robots()` fail.
    pub fn fail_listing(&self, fail: bool) {
        self.state().faults.listing = fail;
    }

    /// Makes every blocking/tagging command fail.
    pub fn fail_commands(&self, fail: bool) {
        self.state().faults.commands = fail;
    }

    /// Makes `robot_status(robot)` fail.
    pub fn fail_status(&self, robot: &str, fail: bool) {
        let mut s = self.state();
        if fail {
            s.faults.status.insert(robot.to_string());
        } else {
            s.faults.status.remove(robot);
        }
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().faults.latency = latency;
    }

    pub fn commands(&self) -> Vec<VendorCommand> {
        self.state().commands.clone()
    }

    pub fn is_blocked(&self, space: &str) -> Option<bool> {
        self.state().blocked.get(space).copied()
    }

    pub fn tag_of(&self, robot: &str) -> Option<LocationStatus> {
        self.state().tags.get(robot).copied()
    }

    async fn delay(&self) {
        let latency = self.state().faults.latency;
        if let Some(d) = latency {
            tokio::time::sleep(d).await;
        }
    }
}

#[async_trait]
impl VendorClient for SimulatedFleet {
    fn access_control(&self) -> AccessControl {
        self.access
    }

    async fn robots(&self) -> Result<Vec<String>, VendorError> {
        self.delay().await;
        let s = self.state();
        if s.faults.listing {
            return Err(VendorError::Command("robot listing unavailable".into()));
        }
        Ok(s.robots.keys().cloned().collect())
    }

    async fn robot_status(&self, robot: &str) -> Result<RobotStatus, VendorError> {
        self.delay().await;
        let s = self.state();
        if s.faults.status.contains(robot) {
            return Err(VendorError::Command(format!("status of {robot} unavailable")));
        }
        s.robots
            .get(robot)
            .copied()
            .ok_or_else(|| VendorError::UnknownRobot(robot.to_string()))
    }

    async fn shared_space_polygon(&self, space: &str) -> Result<Vec<Point>, VendorError> {
        self.delay().await;
        Ok(self.state().polygons.get(space).cloned().unwrap_or_default())
    }

    async fn set_space_blocked(&self, space: &str, blocked: bool) -> Result<(), VendorError> {
        if self.access != AccessControl::ExclusionZone {
            return Err(VendorError::Unsupported("set_space_blocked"));
        }
        self.delay().await;
        let mut s = self.state();
        if s.faults.commands {
            return Err(VendorError::Command(format!("zone {space} rejected")));
        }
        s.blocked.insert(space.to_string(), blocked);
        s.commands.push(VendorCommand::SetSpaceBlocked {
            space: space.to_string(),
            blocked,
        });
        Ok(())
    }

    async fn set_location_status(
        &self,
        robot: &str,
        status: LocationStatus,
    ) -> Result<(), VendorError> {
        if self.access != AccessControl::LocationTag {
            return Err(VendorError::Unsupported("set_location_status"));
        }
        self.delay().await;
        let mut s = self.state();
        if s.faults.commands {
            return Err(VendorError::Command(format!("tag for {robot} rejected")));
        }
        s.tags.insert(robot.to_string(), status);
        s.commands.push(VendorCommand::SetLocationStatus {
            robot: robot.to_string(),
            status,
        });
        Ok(())
    }

    async fn location_status(&self, robot: &str) -> Result<Option<LocationStatus>, VendorError> {
        if self.access != AccessControl::LocationTag {
            return Err(VendorError::Unsupported("location_status"));
        }
        Ok(self.tag_of(robot))
    }
}
