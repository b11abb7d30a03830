//! # Adapter-local spatial state.
//!
//! [`SpatialTracker`] keeps, per robot, the last telemetry point, the containment
//! relative to each known space, the spaces a request was emitted for, and the locks the
//! robot currently holds together with their entry points.
//!
//! Both adapter ticks (request and exit detection) and grant calls from the arbiter read
//! and write it concurrently; every method takes the lock for one short critical section.
//!
//! Nothing here is persisted: after a restart the state is rebuilt from live telemetry.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::clock::EpochMillis;
use crate::geometry::{Point, Polygon};

/// Where a robot is relative to one space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Containment {
    #[default]
    Outside,
    Approaching,
    Inside,
}

impl Containment {
    /// Classifies `p` against `polygon` using the proximity `threshold`.
    pub fn classify(polygon: &Polygon, p: Point, threshold: f64) -> Self {
        if polygon.contains(p) {
            Containment::Inside
        } else if polygon.distance(p) <= threshold {
            Containment::Approaching
        } else {
            Containment::Outside
        }
    }
}

/// Access granted to a robot for one space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeldLock {
    /// Robot position when the grant command succeeded.
    pub entry_point: Point,
    pub granted_at: EpochMillis,
}

/// Everything the adapter knows about one robot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotSpatialState {
    pub last_point: Option<Point>,
    pub containment: BTreeMap<String, Containment>,
    /// Spaces for which a request was emitted in the current waiting episode.
    pub pending: BTreeSet<String>,
    pub held: BTreeMap<String, HeldLock>,
}

/// Concurrency-safe map of [`RobotSpatialState`]s. Cheap to clone.
#[derive(Clone, Default)]
pub struct SpatialTracker {
    inner: Arc<RwLock<HashMap<String, RobotSpatialState>>>,
}

impl SpatialTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_position(&self, robot: &str, point: Point) {
        let mut g = self.inner.write().await;
        g.entry(robot.to_string()).or_default().last_point = Some(point);
    }

    pub async fn set_containment(&self, robot: &str, space: &str, c: Containment) {
        let mut g = self.inner.write().await;
        g.entry(robot.to_string())
            .or_default()
            .containment
            .insert(space.to_string(), c);
    }

    /// Marks a request as emitted; `false` when it already was in this episode.
    pub async fn mark_pending(&self, robot: &str, space: &str) -> bool {
        let mut g = self.inner.write().await;
        g.entry(robot.to_string())
            .or_default()
            .pending
            .insert(space.to_string())
    }

    /// Ends the waiting episode of `robot` at `space`.
    pub async fn clear_pending(&self, robot: &str, space: &str) -> bool {
        let mut g = self.inner.write().await;
        g.get_mut(robot).is_some_and(|s| s.pending.remove(space))
    }

    /// Records a grant; `false` (and no change) when `robot` already holds `space`.
    pub async fn grant(&self, robot: &str, space: &str, entry_point: Point, at: EpochMillis) -> bool {
        let mut g = self.inner.write().await;
        let state = g.entry(robot.to_string()).or_default();
        if state.held.contains_key(space) {
            return false;
        }
        state.pending.remove(space);
        state.held.insert(
            space.to_string(),
            HeldLock {
                entry_point,
                granted_at: at,
            },
        );
        true
    }

    /// Stops tracking `robot` as the holder of `space`.
    pub async fn release(&self, robot: &str, space: &str) -> Option<HeldLock> {
        let mut g = self.inner.write().await;
        g.get_mut(robot).and_then(|s| s.held.remove(space))
    }

    /// Puts back a lock taken by [`release`](Self::release) whose release was not delivered.
    pub async fn restore(&self, robot: &str, space: &str, held: HeldLock) {
        let mut g = self.inner.write().await;
        g.entry(robot.to_string())
            .or_default()
            .held
            .entry(space.to_string())
            .or_insert(held);
    }

    pub async fn holds(&self, robot: &str, space: &str) -> bool {
        let g = self.inner.read().await;
        g.get(robot).is_some_and(|s| s.held.contains_key(space))
    }

    /// True when `robot` holds any space.
    pub async fn is_holder(&self, robot: &str) -> bool {
        let g = self.inner.read().await;
        g.get(robot).is_some_and(|s| !s.held.is_empty())
    }

    /// Every `(robot, space, lock)` currently held, sorted by robot then space.
    pub async fn holders(&self) -> Vec<(String, String, HeldLock)> {
        let g = self.inner.read().await;
        let mut out: Vec<_> = g
            .iter()
            .flat_map(|(robot, s)| {
                s.held
                    .iter()
                    .map(move |(space, lock)| (robot.clone(), space.clone(), *lock))
            })
            .collect();
        out.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        out
    }

    pub async fn last_point(&self, robot: &str) -> Option<Point> {
        let g = self.inner.read().await;
        g.get(robot).and_then(|s| s.last_point)
    }

    pub async fn snapshot(&self, robot: &str) -> Option<RobotSpatialState> {
        let g = self.inner.read().await;
        g.get(robot).cloned()
    }
}
