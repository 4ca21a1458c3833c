use std::path::{Path, PathBuf};

use super::geodesy::Coordinate;
use super::route_index::{RouteIndex, RoutePoint};

pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("route file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read route file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse KML: {0}")]
    Xml(#[from] roxmltree::Error),
}

/// Loads the reference route. Any failure leaves the route empty so the
/// service keeps running with geovalidation disabled.
pub fn load_route(path: &Path) -> RouteIndex {
    match read_route(path) {
        Ok(points) => {
            log::info!("Loaded {} route points from {}", points.len(), path.display());
            RouteIndex::new(points)
        }
        Err(e) => {
            log::warn!("Could not load route, geovalidation disabled: {}", e);
            RouteIndex::default()
        }
    }
}

pub fn read_route(path: &Path) -> Result<Vec<RoutePoint>, RouteError> {
    if !path.exists() {
        return Err(RouteError::NotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| RouteError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_kml(&text)
}

/// Collects every `<coordinates>` tuple (`lon,lat[,alt]`) in document order.
pub fn parse_kml(text: &str) -> Result<Vec<RoutePoint>, RouteError> {
    let document = roxmltree::Document::parse(text)?;
    let mut points = Vec::new();

    for node in document
        .descendants()
        .filter(|n| n.has_tag_name((KML_NAMESPACE, "coordinates")))
    {
        let Some(body) = node.text() else {
            continue;
        };
        for tuple in body.split_whitespace() {
            match parse_tuple(tuple) {
                Some(point) => points.push(point),
                None => log::warn!("Skipping unparsable route coordinate: {}", tuple),
            }
        }
    }

    Ok(points)
}

fn parse_tuple(tuple: &str) -> Option<RoutePoint> {
    let mut parts = tuple.split(',');
    let lon = parse_degrees(parts.next()?)?;
    let lat = parse_degrees(parts.next()?)?;
    Some(Coordinate::new(lat, lon))
}

fn parse_degrees(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ROUTE_KML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Placemark>
      <name>Chainage 0-2</name>
      <LineString>
        <coordinates>
          77.5946,12.9716,0 77.5950,12.9720,0
          77.5955,12.9725
        </coordinates>
      </LineString>
    </Placemark>
    <Placemark>
      <Point><coordinates>77.6000,12.9800,915</coordinates></Point>
    </Placemark>
  </Document>
</kml>"#;

    #[test]
    fn parses_all_coordinate_blocks_as_lat_lon() {
        let points = parse_kml(ROUTE_KML).unwrap();
        assert_eq!(points.len(), 4);
        assert_eq!(points[0], Coordinate::new(12.9716, 77.5946));
        assert_eq!(points[2], Coordinate::new(12.9725, 77.5955));
        assert_eq!(points[3], Coordinate::new(12.9800, 77.6000));
    }

    #[test]
    fn skips_bad_tuples() {
        let kml = r#"<kml xmlns="http://www.opengis.net/kml/2.2"><coordinates>
            77.1,12.1 garbage 77.2 77.3,abc 77.4,12.4
        </coordinates></kml>"#;
        let points = parse_kml(kml).unwrap();
        assert_eq!(
            points,
            vec![Coordinate::new(12.1, 77.1), Coordinate::new(12.4, 77.4)]
        );
    }

    #[test]
    fn skips_non_finite_tuples() {
        let kml = r#"<kml xmlns="http://www.opengis.net/kml/2.2"><coordinates>
            NaN,NaN 77.5946,inf 77.5946,12.9716
        </coordinates></kml>"#;
        let points = parse_kml(kml).unwrap();
        assert_eq!(points, vec![Coordinate::new(12.9716, 77.5946)]);

        let nearest = RouteIndex::new(points).nearest(12.9716, 77.5946).unwrap();
        assert_eq!(nearest.index, 0);
        assert_eq!(nearest.distance_meters, 0.0);
    }

    #[test]
    fn ignores_coordinates_outside_the_kml_namespace() {
        let kml = r#"<kml><coordinates>77.1,12.1</coordinates></kml>"#;
        assert!(parse_kml(kml).unwrap().is_empty());
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(matches!(parse_kml("<kml><coordinates>"), Err(RouteError::Xml(_))));
    }

    #[test]
    fn missing_file_yields_empty_route() {
        let dir = tempfile::tempdir().unwrap();
        let route = load_route(&dir.path().join("absent.kml"));
        assert!(route.is_empty());
    }

    #[test]
    fn loads_route_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ROUTE_KML.as_bytes()).unwrap();

        let route = load_route(file.path());
        assert_eq!(route.len(), 4);
    }
}
