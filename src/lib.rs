//! Delivery route planner.
//!
//! Resolves stops to a road network, builds a road-distance matrix, and finds
//! a closed tour from the depot with an exact solver for small instances and
//! a Christofides approximation for larger ones. Road data and matrices are
//! cached on disk and reused offline.

pub mod cache;
pub mod christofides;
pub mod config;
pub mod coordinate;
pub mod error;
pub mod graph;
pub mod graph_json;
pub mod haversine;
pub mod held_karp;
pub mod matching;
pub mod matrix;
pub mod network;
pub mod overpass;
pub mod planner;
pub mod polyline;
pub mod solver;
pub mod stops;
pub mod traits;

pub use coordinate::Coordinate;
pub use error::PlanningError;
pub use planner::{Planner, PlanningResult};
pub use solver::{SolverChoice, Tour};
