//! Collaborator seams for the route planner.
//!
//! The planner talks to the outside world only through these traits, so the
//! road-data service and the connectivity check can be swapped for stubs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::coordinate::BoundingBox;
use crate::error::{NetworkError, SolverError};
use crate::graph::RoadGraph;
use crate::matrix::DistanceMatrix;
use crate::solver::{Algorithm, Tour};

/// Kind of road network requested from the network-data service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    #[default]
    Drive,
    Walk,
    Bike,
}

impl NetworkType {
    /// Overpass regex over the `highway` tag selecting usable ways.
    pub fn highway_filter(&self) -> &'static str {
        match self {
            NetworkType::Drive => {
                "^(motorway|trunk|primary|secondary|tertiary|unclassified|residential|\
                 motorway_link|trunk_link|primary_link|secondary_link|tertiary_link|\
                 living_street|service|road)$"
            }
            NetworkType::Walk => {
                "^(primary|secondary|tertiary|unclassified|residential|living_street|\
                 service|pedestrian|footway|path|steps|track|road)$"
            }
            NetworkType::Bike => {
                "^(primary|secondary|tertiary|unclassified|residential|living_street|\
                 service|cycleway|path|track|road)$"
            }
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkType::Drive => "drive",
            NetworkType::Walk => "walk",
            NetworkType::Bike => "bike",
        };
        f.write_str(name)
    }
}

/// Returns the road network inside a bounding region.
pub trait NetworkService: Send + Sync {
    fn fetch(&self, bbox: &BoundingBox, network_type: NetworkType) -> Result<RoadGraph, NetworkError>;
}

/// Answers whether the network is currently reachable. Implementations should
/// use a short timeout.
pub trait ConnectivityProbe: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Probe with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedConnectivity(pub bool);

impl ConnectivityProbe for FixedConnectivity {
    fn is_online(&self) -> bool {
        self.0
    }
}

/// Builds a closed tour over a distance matrix whose index 0 is the depot.
pub trait TourSolver {
    fn algorithm(&self) -> Algorithm;

    fn solve(&self, matrix: &DistanceMatrix) -> Result<Tour, SolverError>;
}
