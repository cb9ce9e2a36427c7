//! Tour types, solver selection and the nearest-neighbour fallback.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::christofides::Christofides;
use crate::error::SolverError;
use crate::held_karp::{EXACT_SOLVER_MAX_STOPS, HeldKarp};
use crate::matrix::DistanceMatrix;
use crate::traits::TourSolver;

/// Default number of non-depot stops still solved exactly.
pub const DEFAULT_MAX_STOPS_EXACT: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    HeldKarp,
    Christofides,
    NearestNeighbor,
}

impl Algorithm {
    /// Human-readable label shown with a result.
    pub fn label(&self) -> &'static str {
        match self {
            Algorithm::HeldKarp => "Optimal (Held-Karp)",
            Algorithm::Christofides => "Christofides 1.5-approx",
            Algorithm::NearestNeighbor => "Nearest neighbour",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Closed tour over matrix indices: starts and ends at the depot (0) and
/// visits every other index once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tour {
    pub order: Vec<usize>,
    pub total_distance: f64,
    pub algorithm: Algorithm,
}

impl Tour {
    /// Builds a tour and sums its legs over `matrix`.
    pub fn from_order(order: Vec<usize>, matrix: &DistanceMatrix, algorithm: Algorithm) -> Self {
        let total_distance = matrix.path_length(&order);
        Self {
            order,
            total_distance,
            algorithm,
        }
    }

    /// Number of legs.
    pub fn legs(&self) -> usize {
        self.order.len().saturating_sub(1)
    }

    /// Checks the closed-tour shape for `n` locations.
    pub fn is_valid_for(&self, n: usize) -> bool {
        if n == 0 || self.order.len() != n + 1 {
            return false;
        }
        if self.order[0] != 0 || self.order[n] != 0 {
            return false;
        }
        let mut seen = vec![false; n];
        for &index in &self.order[..n] {
            if index >= n || seen[index] {
                return false;
            }
            seen[index] = true;
        }
        true
    }
}

/// Which solver family the caller asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SolverChoice {
    /// Exact up to the stop threshold, approximate above it.
    #[default]
    Auto,
    Exact,
    Approximate,
}

#[derive(Debug, Clone)]
pub struct SolverPolicy {
    pub max_stops_exact: usize,
}

impl Default for SolverPolicy {
    fn default() -> Self {
        Self {
            max_stops_exact: DEFAULT_MAX_STOPS_EXACT,
        }
    }
}

impl SolverPolicy {
    pub fn new(max_stops_exact: usize) -> Self {
        Self { max_stops_exact }
    }

    /// Picks the algorithm for `n` locations, depot included. Auto mode never
    /// hands the exact solver more stops than it accepts.
    pub fn select(&self, choice: SolverChoice, n: usize) -> Algorithm {
        if n < 2 {
            return Algorithm::NearestNeighbor;
        }
        match choice {
            SolverChoice::Exact => Algorithm::HeldKarp,
            SolverChoice::Approximate => Algorithm::Christofides,
            SolverChoice::Auto if n - 1 <= self.max_stops_exact.min(EXACT_SOLVER_MAX_STOPS) => {
                Algorithm::HeldKarp
            }
            SolverChoice::Auto => Algorithm::Christofides,
        }
    }

    pub fn solve(&self, choice: SolverChoice, matrix: &DistanceMatrix) -> Result<Tour, SolverError> {
        run(self.select(choice, matrix.len()), matrix)
    }
}

/// Runs one algorithm.
pub fn run(algorithm: Algorithm, matrix: &DistanceMatrix) -> Result<Tour, SolverError> {
    match algorithm {
        Algorithm::HeldKarp => HeldKarp.solve(matrix),
        Algorithm::Christofides => Christofides.solve(matrix),
        Algorithm::NearestNeighbor => NearestNeighbor.solve(matrix),
    }
}

/// Greedy tour: always move to the closest unvisited location. Ties go to
/// the lowest index.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighbor;

impl TourSolver for NearestNeighbor {
    fn algorithm(&self) -> Algorithm {
        Algorithm::NearestNeighbor
    }

    fn solve(&self, matrix: &DistanceMatrix) -> Result<Tour, SolverError> {
        let n = matrix.len();
        let mut visited = vec![false; n];
        let mut order = Vec::with_capacity(n + 1);
        let mut current = 0;
        visited[0] = true;
        order.push(0);

        for _ in 1..n {
            let next = (0..n)
                .filter(|&j| !visited[j])
                .min_by(|&a, &b| matrix.get(current, a).total_cmp(&matrix.get(current, b)));
            let Some(next) = next else {
                break;
            };
            visited[next] = true;
            order.push(next);
            current = next;
        }
        order.push(0);

        Ok(Tour::from_order(order, matrix, Algorithm::NearestNeighbor))
    }
}
