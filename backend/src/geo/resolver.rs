use shared::LocationSource;

use super::geodesy::Coordinate;
use super::route_index::{RouteIndex, RoutePoint};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedLocation {
    pub coordinate: Coordinate,
    pub source: LocationSource,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationResult {
    pub nearest_index: usize,
    pub nearest_point: RoutePoint,
    pub distance_meters: f64,
    pub within_tolerance: bool,
}

impl ValidationResult {
    pub fn rounded_distance(&self) -> f64 {
        round_to_centimeters(self.distance_meters)
    }
}

/// Outcome of the Located and Validated stages for one image.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Located {
    pub location: Option<ResolvedLocation>,
    pub validation: Option<ValidationResult>,
}

/// A client coordinate only counts when both halves were supplied.
pub fn client_coordinate(latitude: Option<f64>, longitude: Option<f64>) -> Option<Coordinate> {
    match (latitude, longitude) {
        (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
        _ => None,
    }
}

/// Client coordinates are authoritative; OCR is used only when the client
/// sent none.
pub fn resolve_location(
    client: Option<Coordinate>,
    ocr: Option<Coordinate>,
) -> Option<ResolvedLocation> {
    client
        .map(|coordinate| ResolvedLocation {
            coordinate,
            source: LocationSource::Client,
        })
        .or_else(|| {
            ocr.map(|coordinate| ResolvedLocation {
                coordinate,
                source: LocationSource::Ocr,
            })
        })
}

pub fn within_tolerance(distance_meters: f64, tolerance_meters: f64) -> bool {
    distance_meters <= tolerance_meters
}

pub fn validate_location(
    route: &RouteIndex,
    coordinate: Coordinate,
    tolerance_meters: f64,
) -> Option<ValidationResult> {
    let nearest = route.nearest(coordinate.latitude, coordinate.longitude)?;
    Some(ValidationResult {
        nearest_index: nearest.index,
        nearest_point: nearest.point,
        distance_meters: nearest.distance_meters,
        within_tolerance: within_tolerance(nearest.distance_meters, tolerance_meters),
    })
}

pub fn locate(
    client: Option<Coordinate>,
    ocr: Option<Coordinate>,
    route: &RouteIndex,
    tolerance_meters: f64,
) -> Located {
    let location = resolve_location(client, ocr);
    let validation =
        location.and_then(|l| validate_location(route, l.coordinate, tolerance_meters));
    Located {
        location,
        validation,
    }
}

pub fn round_to_centimeters(meters: f64) -> f64 {
    (meters * 100.0).round() / 100.0
}
