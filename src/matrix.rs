//! Distance matrices and the road-network matrix builder.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::MatrixError;
use crate::graph::RoadGraph;
use crate::haversine::haversine_m;
use crate::network::NodeAssignment;

/// Graphs with at most this many assigned nodes compute every source in one
/// parallel pass.
pub const DEFAULT_ALL_PAIRS_THRESHOLD: usize = 20;

/// Square, non-negative matrix of distances in meters. Index 0 is the depot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct DistanceMatrix {
    rows: Vec<Vec<f64>>,
}

impl DistanceMatrix {
    /// Validates and wraps the given rows.
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self, MatrixError> {
        let n = rows.len();
        if n == 0 {
            return Err(MatrixError::Empty);
        }

        for (row, values) in rows.iter().enumerate() {
            if values.len() != n {
                return Err(MatrixError::NotSquare {
                    row,
                    len: values.len(),
                    expected: n,
                });
            }
            for (col, &value) in values.iter().enumerate() {
                if !value.is_finite() {
                    return Err(MatrixError::NonFinite { row, col });
                }
                if value < 0.0 {
                    return Err(MatrixError::Negative { row, col, value });
                }
            }
        }

        Ok(Self { rows })
    }

    /// Number of locations, depot included.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[inline]
    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.rows[from][to]
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Sum of consecutive legs along `order`.
    pub fn path_length(&self, order: &[usize]) -> f64 {
        order.windows(2).map(|leg| self.get(leg[0], leg[1])).sum()
    }
}

impl TryFrom<Vec<Vec<f64>>> for DistanceMatrix {
    type Error = MatrixError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::new(rows)
    }
}

impl From<DistanceMatrix> for Vec<Vec<f64>> {
    fn from(matrix: DistanceMatrix) -> Self {
        matrix.rows
    }
}

/// Computes shortest road distances between assigned nodes.
///
/// Pairs without a path fall back to the haversine distance between the
/// assigned positions, so the result never has a zero off-diagonal entry
/// just because the graph is disconnected.
#[derive(Debug, Clone)]
pub struct DistanceMatrixBuilder {
    all_pairs_threshold: usize,
}

impl Default for DistanceMatrixBuilder {
    fn default() -> Self {
        Self {
            all_pairs_threshold: DEFAULT_ALL_PAIRS_THRESHOLD,
        }
    }
}

impl DistanceMatrixBuilder {
    pub fn new(all_pairs_threshold: usize) -> Self {
        Self { all_pairs_threshold }
    }

    pub fn build(
        &self,
        graph: &RoadGraph,
        assignment: &NodeAssignment,
    ) -> Result<DistanceMatrix, MatrixError> {
        let n = assignment.len();

        // Row i holds distances to every j > i, so each unordered pair is
        // computed once.
        let upper: Vec<Vec<f64>> = if n <= self.all_pairs_threshold {
            debug!(nodes = n, "computing all sources in one pass");
            (0..n)
                .into_par_iter()
                .map(|i| upper_row(graph, assignment, i))
                .collect()
        } else {
            debug!(nodes = n, "computing one source at a time");
            (0..n).map(|i| upper_row(graph, assignment, i)).collect()
        };

        let mut rows = vec![vec![0.0; n]; n];
        for (i, row) in upper.into_iter().enumerate() {
            for (offset, meters) in row.into_iter().enumerate() {
                let j = i + 1 + offset;
                rows[i][j] = meters;
                rows[j][i] = meters;
            }
        }

        DistanceMatrix::new(rows)
    }
}

fn upper_row(graph: &RoadGraph, assignment: &NodeAssignment, i: usize) -> Vec<f64> {
    let n = assignment.len();
    let source = assignment.node(i);
    let lengths = graph.shortest_path_lengths(source);

    (i + 1..n)
        .map(|j| {
            let target = assignment.node(j);
            if target == source {
                // Both stops share a node after the jitter escape.
                return straight_line(graph, assignment, i, j);
            }
            match lengths.get(&target) {
                Some(&meters) => meters,
                None => {
                    debug!(source, target, "no road path, using haversine distance");
                    straight_line(graph, assignment, i, j)
                }
            }
        })
        .collect()
}

fn straight_line(graph: &RoadGraph, assignment: &NodeAssignment, i: usize, j: usize) -> f64 {
    match (assignment.position(i, graph), assignment.position(j, graph)) {
        (Some(from), Some(to)) => haversine_m(from, to),
        _ => {
            warn!(i, j, "assigned node missing from graph");
            0.0
        }
    }
}
