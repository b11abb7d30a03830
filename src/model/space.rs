use crate::error::GeometryError;
use crate::geometry::{build_polygon, Point, Polygon};

/// Externally observable occupancy of a shared space.
///
/// Mirrors the presence of a lock record; it is derived, never authoritative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SpaceState {
    #[default]
    Open,
    Occupied,
}

impl SpaceState {
    pub fn as_str(self) -> &'static str {
        match self {
            SpaceState::Open => "OPEN",
            SpaceState::Occupied => "OCCUPIED",
        }
    }
}

/// A contested polygon region that only one robot may occupy at a time.
#[derive(Clone, Debug)]
pub struct SharedSpace {
    /// Stable external identifier (the partition key of the queue).
    pub id: String,
    /// Fleet that owns the space definition.
    pub owner_fleet_id: String,
    /// `None` until a polygon has been loaded for the space.
    pub polygon: Option<Polygon>,
    pub state: SpaceState,
}

impl SharedSpace {
    /// A space without geometry yet (the arbiter never needs it).
    pub fn new(id: impl Into<String>, owner_fleet_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_fleet_id: owner_fleet_id.into(),
            polygon: None,
            state: SpaceState::Open,
        }
    }

    /// A space bounded by `points`; an empty list leaves it unconfigured.
    pub fn with_outline(
        id: impl Into<String>,
        owner_fleet_id: impl Into<String>,
        points: &[Point],
    ) -> Result<Self, GeometryError> {
        let mut space = Self::new(id, owner_fleet_id);
        space.polygon = build_polygon(points)?;
        Ok(space)
    }

    pub fn is_configured(&self) -> bool {
        self.polygon.is_some()
    }
}
