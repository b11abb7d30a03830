//! # Events exchanged between fleet adapters and the arbiter.
//!
//! Payloads serialize as flat records using the shared wire names
//! (`workerFleetArn`, `workerArn`, `sharedSpaceArn`, ...).
//!
//! ```
//! use spacevisor::AccessRequest;
//!
//! let req = AccessRequest {
//!     fleet_id: "fleet-a".into(),
//!     robot: "amr-17".into(),
//!     space_id: "fire-door-3".into(),
//!     request_time: 1_700_000_000_100,
//! };
//! let json = serde_json::to_string(&req).unwrap();
//! assert!(json.contains(r#""workerArn":"amr-17""#));
//! assert!(json.contains(r#""requestTime":1700000000100"#));
//! ```

use serde::{Deserialize, Serialize};

use crate::clock::EpochMillis;

/// Tag used to register handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FleetEventKind {
    Request,
    Release,
    GrantFailed,
}

impl FleetEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FleetEventKind::Request => "REQUEST",
            FleetEventKind::Release => "RELEASE",
            FleetEventKind::GrantFailed => "GRANT_FAILED",
        }
    }
}

/// A waiting robot asks for a shared space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    #[serde(rename = "workerFleetArn")]
    pub fleet_id: String,
    #[serde(rename = "workerArn")]
    pub robot: String,
    #[serde(rename = "sharedSpaceArn")]
    pub space_id: String,
    pub request_time: EpochMillis,
}

/// A lock holder physically left a shared space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    #[serde(rename = "workerFleetArn")]
    pub fleet_id: String,
    #[serde(rename = "workerArn")]
    pub robot: String,
    #[serde(rename = "sharedSpaceArn")]
    pub space_id: String,
    pub release_time: EpochMillis,
}

/// The vendor command behind a grant failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantFailed {
    #[serde(rename = "workerArn")]
    pub robot: String,
    #[serde(rename = "sharedSpaceArn")]
    pub space_id: String,
    pub message: String,
}

/// Any event an adapter hands to its registered handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetEvent {
    Request(AccessRequest),
    Release(Release),
    GrantFailed(GrantFailed),
}

impl FleetEvent {
    pub fn kind(&self) -> FleetEventKind {
        match self {
            FleetEvent::Request(_) => FleetEventKind::Request,
            FleetEvent::Release(_) => FleetEventKind::Release,
            FleetEvent::GrantFailed(_) => FleetEventKind::GrantFailed,
        }
    }

    pub fn robot(&self) -> &str {
        match self {
            FleetEvent::Request(e) => &e.robot,
            FleetEvent::Release(e) => &e.robot,
            FleetEvent::GrantFailed(e) => &e.robot,
        }
    }

    pub fn space_id(&self) -> &str {
        match self {
            FleetEvent::Request(e) => &e.space_id,
            FleetEvent::Release(e) => &e.space_id,
            FleetEvent::GrantFailed(e) => &e.space_id,
        }
    }
}
