use lazy_static::lazy_static;
use regex::Regex;

use super::geodesy::Coordinate;

lazy_static! {
    static ref LATITUDE: Regex =
        Regex::new(r"(?i)latitude[:\s]*(-?[0-9]+\.[0-9]+)").expect("latitude pattern compiles");
    static ref LONGITUDE: Regex =
        Regex::new(r"(?i)longitude[:\s]*(-?[0-9]+\.[0-9]+)").expect("longitude pattern compiles");
}

/// Finds `Latitude <number>` and `Longitude <number>` anywhere in the text.
/// Both must be present; a lone latitude or longitude counts as nothing.
pub fn extract_coordinate(text: &str) -> Option<Coordinate> {
    let latitude = first_number(&LATITUDE, text)?;
    let longitude = first_number(&LONGITUDE, text)?;
    Some(Coordinate::new(latitude, longitude))
}

/// Joins OCR fragments in recognition order before searching.
pub fn extract_from_fragments(fragments: &[String]) -> Option<Coordinate> {
    extract_coordinate(&fragments.join("\n"))
}

fn first_number(pattern: &Regex, text: &str) -> Option<f64> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
