//! Geographic value types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Planar distance in degrees. Only meaningful for relative comparisons
    /// over short distances.
    pub fn planar_distance(&self, other: &Coordinate) -> f64 {
        ((self.lat - other.lat).powi(2) + (self.lon - other.lon).powi(2)).sqrt()
    }

    pub fn offset(&self, d_lat: f64, d_lon: f64) -> Self {
        Self::new(self.lat + d_lat, self.lon + d_lon)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self::new(lat, lon)
    }
}

/// Axis-aligned region in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Smallest box containing every coordinate, padded by `padding` degrees
    /// on each side. `None` for an empty slice.
    pub fn around(coords: &[Coordinate], padding: f64) -> Option<Self> {
        let first = coords.first()?;
        let mut bbox = Self {
            min_lat: first.lat,
            min_lon: first.lon,
            max_lat: first.lat,
            max_lon: first.lon,
        };
        for coord in &coords[1..] {
            bbox.min_lat = bbox.min_lat.min(coord.lat);
            bbox.min_lon = bbox.min_lon.min(coord.lon);
            bbox.max_lat = bbox.max_lat.max(coord.lat);
            bbox.max_lon = bbox.max_lon.max(coord.lon);
        }

        Some(Self {
            min_lat: bbox.min_lat - padding,
            min_lon: bbox.min_lon - padding,
            max_lat: bbox.max_lat + padding,
            max_lon: bbox.max_lon + padding,
        })
    }

    pub fn contains(&self, coord: &Coordinate) -> bool {
        coord.lat >= self.min_lat
            && coord.lat <= self.max_lat
            && coord.lon >= self.min_lon
            && coord.lon <= self.max_lon
    }
}
