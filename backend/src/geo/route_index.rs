use super::geodesy::{distance_meters, Coordinate};

pub type RoutePoint = Coordinate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPoint {
    pub index: usize,
    pub distance_meters: f64,
    pub point: RoutePoint,
}

/// Ordered reference route, loaded once and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct RouteIndex {
    points: Vec<RoutePoint>,
}

impl RouteIndex {
    pub fn new(points: Vec<RoutePoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[RoutePoint] {
        &self.points
    }

    /// Linear scan for the closest route point. Ties go to the lowest index.
    /// Points at an undefined (NaN) distance never match, so an empty route
    /// or a non-finite query yields `None`.
    pub fn nearest(&self, latitude: f64, longitude: f64) -> Option<NearestPoint> {
        let mut best: Option<NearestPoint> = None;

        for (index, point) in self.points.iter().enumerate() {
            let distance = distance_meters(latitude, longitude, point.latitude, point.longitude);
            if distance.is_nan() {
                continue;
            }
            if best.is_none_or(|b| distance < b.distance_meters) {
                best = Some(NearestPoint {
                    index,
                    distance_meters: distance,
                    point: *point,
                });
            }
        }

        best
    }
}
