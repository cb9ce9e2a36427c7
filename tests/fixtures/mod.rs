//! Test fixtures for route-planner.
//!
//! Provides:
//! - Named locations around the default depot
//! - Grid road networks and stub network services
//! - Distance-matrix generators and a brute-force tour oracle

#![allow(dead_code)]

pub mod karachi_locations;

pub use karachi_locations::*;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use geo_types::LineString;
use rand::Rng;
use route_planner::Coordinate;
use route_planner::config::PlannerConfig;
use route_planner::coordinate::BoundingBox;
use route_planner::error::NetworkError;
use route_planner::graph::{AttrValue, NodeId, RoadEdge, RoadGraph, RoadNode};
use route_planner::haversine::haversine_m;
use route_planner::matrix::DistanceMatrix;
use route_planner::traits::{ConnectivityProbe, NetworkService, NetworkType};
use serde_json::json;

// ============================================================================
// Road networks
// ============================================================================

/// First node id of a grid built by [`grid_graph`].
pub const GRID_FIRST_ID: NodeId = 1000;

/// `rows` x `cols` street grid starting at `origin` (south-west corner),
/// with `step` degrees between neighbouring intersections.
pub fn grid_graph(origin: Coordinate, rows: usize, cols: usize, step: f64) -> RoadGraph {
    let id = |r: usize, c: usize| GRID_FIRST_ID + (r * cols + c) as NodeId;
    let position = |r: usize, c: usize| origin.offset(r as f64 * step, c as f64 * step);

    let mut graph = RoadGraph::new();
    for r in 0..rows {
        for c in 0..cols {
            graph.add_node(
                id(r, c),
                RoadNode::at(position(r, c)).with_attr("osmid", json!(id(r, c))),
            );
        }
    }

    let mut way = 0;
    for r in 0..rows {
        for c in 0..cols {
            for (r2, c2) in [(r + 1, c), (r, c + 1)] {
                if r2 >= rows || c2 >= cols {
                    continue;
                }
                way += 1;
                let (a, b) = (position(r, c), position(r2, c2));
                let geometry = LineString::from(vec![(a.lon, a.lat), (b.lon, b.lat)]);
                graph.add_edge(
                    id(r, c),
                    id(r2, c2),
                    RoadEdge::new(haversine_m(a, b))
                        .with_attr("highway", json!("residential"))
                        .with_attr("osmid", AttrValue::set([json!(way)]))
                        .with_attr("geometry", AttrValue::Geometry(geometry.into())),
                );
            }
        }
    }
    graph
}

/// Grid covering every fixture location with 0.002° (~200 m) blocks.
pub fn city_grid() -> RoadGraph {
    grid_graph(Coordinate::new(24.832, 67.016), 17, 18, 0.002)
}

// ============================================================================
// Collaborator stubs
// ============================================================================

/// Serves a fixed graph and counts requests.
pub struct StaticNetwork {
    graph: RoadGraph,
    calls: AtomicUsize,
}

impl StaticNetwork {
    pub fn new(graph: RoadGraph) -> Self {
        Self {
            graph,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NetworkService for StaticNetwork {
    fn fetch(&self, _bbox: &BoundingBox, _network_type: NetworkType) -> Result<RoadGraph, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.graph.clone())
    }
}

/// Always answers like an overloaded server.
pub struct FailingNetwork;

impl NetworkService for FailingNetwork {
    fn fetch(&self, _bbox: &BoundingBox, _network_type: NetworkType) -> Result<RoadGraph, NetworkError> {
        Err(NetworkError::Service { status: 503 })
    }
}

/// Answers successfully with a graph that has no nodes.
pub struct EmptyNetwork;

impl NetworkService for EmptyNetwork {
    fn fetch(&self, _bbox: &BoundingBox, _network_type: NetworkType) -> Result<RoadGraph, NetworkError> {
        Ok(RoadGraph::new())
    }
}

/// Connectivity probe that tests can flip.
pub struct SwitchableProbe(AtomicBool);

impl SwitchableProbe {
    pub fn new(online: bool) -> Self {
        Self(AtomicBool::new(online))
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl ConnectivityProbe for SwitchableProbe {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn test_config(cache_dir: &Path) -> PlannerConfig {
    PlannerConfig {
        cache_dir: cache_dir.to_path_buf(),
        cache_sweep_probability: 0.0,
        ..PlannerConfig::default()
    }
}

// ============================================================================
// Distance matrices
// ============================================================================

/// Euclidean distances between `n` random points in a 1 km square. Always
/// metric.
pub fn euclidean_matrix<R: Rng>(n: usize, rng: &mut R) -> DistanceMatrix {
    let points: Vec<(f64, f64)> = (0..n)
        .map(|_| (rng.random_range(0.0..1000.0), rng.random_range(0.0..1000.0)))
        .collect();
    let rows = points
        .iter()
        .map(|a| {
            points
                .iter()
                .map(|b| ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt())
                .collect()
        })
        .collect();
    DistanceMatrix::new(rows).unwrap()
}

/// Symmetric matrix with independent random entries; usually not metric.
pub fn random_symmetric_matrix<R: Rng>(n: usize, rng: &mut R) -> DistanceMatrix {
    let mut rows = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i + 1..n {
            let value = rng.random_range(1.0..500.0);
            rows[i][j] = value;
            rows[j][i] = value;
        }
    }
    DistanceMatrix::new(rows).unwrap()
}

pub fn constant_matrix(n: usize, value: f64) -> DistanceMatrix {
    let rows = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 0.0 } else { value }).collect())
        .collect();
    DistanceMatrix::new(rows).unwrap()
}

/// Shortest closed tour from index 0 by trying every permutation.
pub fn brute_force_optimum(matrix: &DistanceMatrix) -> f64 {
    fn search(matrix: &DistanceMatrix, current: usize, visited: &mut [bool], depth: usize, cost: f64, best: &mut f64) {
        let n = visited.len();
        if depth == n {
            *best = best.min(cost + matrix.get(current, 0));
            return;
        }
        for next in 1..n {
            if !visited[next] {
                visited[next] = true;
                search(matrix, next, visited, depth + 1, cost + matrix.get(current, next), best);
                visited[next] = false;
            }
        }
    }

    let n = matrix.len();
    if n == 1 {
        return 0.0;
    }
    let mut visited = vec![false; n];
    visited[0] = true;
    let mut best = f64::INFINITY;
    search(matrix, 0, &mut visited, 1, 0.0, &mut best);
    best
}
