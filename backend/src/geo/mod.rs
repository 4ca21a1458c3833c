pub mod geodesy;
pub mod kml;
pub mod location;
pub mod resolver;
pub mod route_index;

pub use geodesy::{distance_meters, Coordinate};
pub use resolver::{Located, ResolvedLocation, ValidationResult};
pub use route_index::{NearestPoint, RouteIndex, RoutePoint};
