use crate::error::GeometryError;

use super::Point;

/// Boundary tolerance for containment.
const EDGE_EPSILON: f64 = 1e-9;

/// Closed ring of vertices bounding a shared space.
///
/// The last vertex always equals the first. Immutable after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    ring: Vec<Point>,
}

impl Polygon {
    /// Vertices of the closed ring, closing point included.
    pub fn ring(&self) -> &[Point] {
        &self.ring
    }

    /// Iterates the edges of the ring.
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        self.ring.windows(2).map(|w| (w[0], w[1]))
    }

    /// See [`contains`].
    #[inline]
    pub fn contains(&self, p: Point) -> bool {
        contains(self, p)
    }

    /// See [`distance`].
    #[inline]
    pub fn distance(&self, p: Point) -> f64 {
        distance(self, p)
    }

    /// See [`is_approaching`].
    #[inline]
    pub fn is_approaching(&self, p: Point, threshold: f64) -> bool {
        is_approaching(self, p, threshold)
    }

    fn edge_distance(&self, p: Point) -> f64 {
        self.edges()
            .map(|(a, b)| p.distance_to_segment(a, b))
            .fold(f64::INFINITY, f64::min)
    }
}

/// Builds a closed polygon from an ordered vertex list.
///
/// - empty input → `Ok(None)`: the space is not configured yet;
/// - the ring is closed by appending the first point unless already closed;
/// - fewer than 3 distinct points → [`GeometryError::InsufficientPoints`].
///
/// # Example
/// ```
/// use spacevisor::geometry::{build_polygon, Point};
///
/// let open = [(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)].map(Point::from);
/// let mut closed = open.to_vec();
/// closed.push(open[0]);
///
/// assert_eq!(build_polygon(&open).unwrap(), build_polygon(&closed).unwrap());
/// assert!(build_polygon(&[]).unwrap().is_none());
/// ```
pub fn build_polygon(points: &[Point]) -> Result<Option<Polygon>, GeometryError> {
    let Some(&first) = points.first() else {
        return Ok(None);
    };

    let mut ring = points.to_vec();
    if ring.last() != Some(&first) || ring.len() == 1 {
        ring.push(first);
    }

    let distinct = distinct_count(&ring[..ring.len() - 1]);
    if distinct < 3 {
        return Err(GeometryError::InsufficientPoints { distinct });
    }
    Ok(Some(Polygon { ring }))
}

fn distinct_count(points: &[Point]) -> usize {
    let mut keys: Vec<(u64, u64)> = points
        .iter()
        .map(|p| ((p.x + 0.0).to_bits(), (p.y + 0.0).to_bits()))
        .collect();
    keys.sort_unstable();
    keys.dedup();
    keys.len()
}

/// Planar point-in-polygon test (even-odd rule). Boundary points are contained.
pub fn contains(polygon: &Polygon, p: Point) -> bool {
    if polygon.edge_distance(p) <= EDGE_EPSILON {
        return true;
    }

    let mut inside = false;
    for (a, b) in polygon.edges() {
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

/// 0 when contained, otherwise the Euclidean distance to the nearest edge.
pub fn distance(polygon: &Polygon, p: Point) -> f64 {
    if contains(polygon, p) {
        0.0
    } else {
        polygon.edge_distance(p)
    }
}

/// True iff `p` is outside the polygon but within `threshold` of it.
pub fn is_approaching(polygon: &Polygon, p: Point, threshold: f64) -> bool {
    !contains(polygon, p) && distance(polygon, p) <= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::APPROACH_THRESHOLD_M;

    fn square() -> Polygon {
        let pts = [(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)].map(Point::from);
        build_polygon(&pts).unwrap().unwrap()
    }

    #[test]
    fn closed_and_open_rings_build_the_same_polygon() {
        let open = [(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)].map(Point::from);
        let mut closed = open.to_vec();
        closed.push(open[0]);

        let a = build_polygon(&open).unwrap().unwrap();
        let b = build_polygon(&closed).unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.ring().len(), 5);
        assert_eq!(a.ring().first(), a.ring().last());
    }

    #[test]
    fn empty_input_is_not_configured() {
        assert_eq!(build_polygon(&[]), Ok(None));
    }

    #[test]
    fn degenerate_rings_are_rejected() {
        let one = [Point::new(1.0, 1.0)];
        assert_eq!(
            build_polygon(&one),
            Err(GeometryError::InsufficientPoints { distinct: 1 })
        );

        let line = [(0.0, 0.0), (5.0, 5.0), (0.0, 0.0)].map(Point::from);
        assert_eq!(
            build_polygon(&line),
            Err(GeometryError::InsufficientPoints { distinct: 2 })
        );

        let repeated = [(0.0, 0.0), (0.0, 0.0), (3.0, 0.0), (3.0, 0.0)].map(Point::from);
        assert!(build_polygon(&repeated).is_err());
    }

    #[test]
    fn boundary_points_are_contained() {
        let sq = square();
        assert!(contains(&sq, Point::new(0.0, 5.0)));
        assert!(contains(&sq, Point::new(10.0, 10.0)));
        assert!(contains(&sq, Point::new(5.0, 0.0)));
        assert_eq!(distance(&sq, Point::new(10.0, 3.0)), 0.0);
    }

    #[test]
    fn interior_and_exterior() {
        let sq = square();
        assert!(contains(&sq, Point::new(5.0, 5.0)));
        assert!(!contains(&sq, Point::new(-0.5, 5.0)));
        assert!(!contains(&sq, Point::new(5.0, 10.5)));
        assert_eq!(distance(&sq, Point::new(5.0, 5.0)), 0.0);
        assert_eq!(distance(&sq, Point::new(13.0, 14.0)), 5.0);
    }

    #[test]
    fn concave_polygon_notch_is_outside() {
        // U shape opening upwards.
        let pts = [
            (0.0, 0.0),
            (9.0, 0.0),
            (9.0, 9.0),
            (6.0, 9.0),
            (6.0, 3.0),
            (3.0, 3.0),
            (3.0, 9.0),
            (0.0, 9.0),
        ]
        .map(Point::from);
        let u = build_polygon(&pts).unwrap().unwrap();
        assert!(!contains(&u, Point::new(4.5, 6.0)));
        assert_eq!(distance(&u, Point::new(4.5, 6.0)), 1.5);
        assert!(contains(&u, Point::new(1.5, 6.0)));
    }

    #[test]
    fn approach_detection_near_the_east_edge() {
        let sq = square();
        assert!(is_approaching(&sq, Point::new(11.0, 5.0), APPROACH_THRESHOLD_M));
        assert!(!is_approaching(&sq, Point::new(13.0, 5.0), APPROACH_THRESHOLD_M));
        assert!(is_approaching(&sq, Point::new(12.0, 5.0), APPROACH_THRESHOLD_M));
        // inside is never approaching
        assert!(!is_approaching(&sq, Point::new(9.0, 5.0), APPROACH_THRESHOLD_M));
    }
}
