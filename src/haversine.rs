//! Haversine great-circle distances (fallback when no road path exists).
//!
//! Less accurate than a road network distance (ignores roads) but always
//! available.

use crate::coordinate::Coordinate;
use crate::error::MatrixError;
use crate::matrix::DistanceMatrix;

/// Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Calculate haversine distance between two points in kilometers.
pub fn haversine_km(from: Coordinate, to: Coordinate) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lon - from.lon).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Haversine distance in meters.
pub fn haversine_m(from: Coordinate, to: Coordinate) -> f64 {
    haversine_km(from, to) * 1000.0
}

/// Straight-line distance matrix in meters over the given locations.
pub fn straight_line_matrix(locations: &[Coordinate]) -> Result<DistanceMatrix, MatrixError> {
    let n = locations.len();
    let mut rows = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in i + 1..n {
            let meters = haversine_m(locations[i], locations[j]);
            rows[i][j] = meters;
            rows[j][i] = meters;
        }
    }

    DistanceMatrix::new(rows)
}
