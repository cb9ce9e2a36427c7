//! Polyline representation for route geometries.
//!
//! A route is stitched together from one segment per tour leg. Consecutive
//! segments share an endpoint, which is stored once.

use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;

/// A polyline representing a route geometry as decoded coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Coordinate>,
}

impl Polyline {
    /// Creates a new Polyline from coordinate points.
    pub fn new(points: Vec<Coordinate>) -> Self {
        Self { points }
    }

    /// Returns a reference to the coordinate points.
    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    /// Consumes the polyline and returns the owned coordinate points.
    pub fn into_points(self) -> Vec<Coordinate> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Appends a segment that starts where the polyline currently ends. The
    /// segment's first point is dropped unless the polyline is still empty.
    pub fn push_segment<I>(&mut self, segment: I)
    where
        I: IntoIterator<Item = Coordinate>,
    {
        let skip = usize::from(!self.points.is_empty());
        self.points.extend(segment.into_iter().skip(skip));
    }
}
