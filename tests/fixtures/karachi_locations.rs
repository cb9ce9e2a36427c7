//! Delivery locations around the default Karachi depot.
//!
//! All points lie within the default random-stop spread (±0.015°) of the
//! depot, so they fit inside one road-network request.

use route_planner::Coordinate;

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lon: f64) -> Self {
        Self { name, lat, lon }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }
}

pub const DEPOT: Location = Location::new("Depot", 24.848, 67.032);

// ============================================================================
// Stops
// ============================================================================

pub const STOPS: &[Location] = &[
    Location::new("Stop A", 24.8536, 67.0287),
    Location::new("Stop B", 24.8441, 67.0392),
    Location::new("Stop C", 24.8567, 67.0418),
    Location::new("Stop D", 24.8392, 67.0251),
    Location::new("Stop E", 24.8503, 67.0189),
    Location::new("Stop F", 24.8418, 67.0463),
    Location::new("Stop G", 24.8604, 67.0336),
    Location::new("Stop H", 24.8355, 67.0374),
    Location::new("Stop I", 24.8471, 67.0442),
    Location::new("Stop J", 24.8589, 67.0221),
    Location::new("Stop K", 24.8376, 67.0302),
    Location::new("Stop L", 24.8525, 67.0478),
    Location::new("Stop M", 24.8449, 67.0207),
    Location::new("Stop N", 24.8621, 67.0401),
];

/// Depot followed by the first `count` stops.
pub fn depot_and_stops(count: usize) -> Vec<Coordinate> {
    std::iter::once(DEPOT.coordinate())
        .chain(STOPS.iter().take(count).map(Location::coordinate))
        .collect()
}
