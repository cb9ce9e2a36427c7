//! Exact tour by dynamic programming over subsets of stops.
//!
//! `cost[mask][j]` is the cheapest path that leaves the depot, visits exactly
//! the stops in `mask` and ends at stop `j`. Time is `O(2^m * m^2)` and memory
//! `O(2^m * m)` for `m` non-depot stops, so the solver refuses more than
//! [`EXACT_SOLVER_MAX_STOPS`] stops.

use tracing::debug;

use crate::error::SolverError;
use crate::matrix::DistanceMatrix;
use crate::solver::{Algorithm, Tour};
use crate::traits::TourSolver;

/// Largest number of non-depot stops the exact solver accepts.
pub const EXACT_SOLVER_MAX_STOPS: usize = 18;

const NO_PARENT: u8 = u8::MAX;

#[derive(Debug, Clone, Copy, Default)]
pub struct HeldKarp;

impl TourSolver for HeldKarp {
    fn algorithm(&self) -> Algorithm {
        Algorithm::HeldKarp
    }

    fn solve(&self, matrix: &DistanceMatrix) -> Result<Tour, SolverError> {
        let n = matrix.len();
        let m = n - 1;
        if m > EXACT_SOLVER_MAX_STOPS {
            return Err(SolverError::TooLargeForExact {
                stops: m,
                limit: EXACT_SOLVER_MAX_STOPS,
            });
        }
        if m == 0 {
            return Ok(Tour::from_order(vec![0, 0], matrix, Algorithm::HeldKarp));
        }

        // Stop `j` in the DP is matrix index `j + 1`.
        let states = 1usize << m;
        let mut cost = vec![f64::INFINITY; states * m];
        let mut parent = vec![NO_PARENT; states * m];
        for j in 0..m {
            cost[(1 << j) * m + j] = matrix.get(0, j + 1);
        }

        for mask in 1..states {
            if mask.count_ones() < 2 {
                continue;
            }
            let mut bits = mask;
            while bits != 0 {
                let j = bits.trailing_zeros() as usize;
                bits &= bits - 1;

                let prev_mask = mask & !(1 << j);
                let mut best = f64::INFINITY;
                let mut best_k = NO_PARENT;
                let mut prev_bits = prev_mask;
                while prev_bits != 0 {
                    let k = prev_bits.trailing_zeros() as usize;
                    prev_bits &= prev_bits - 1;
                    let candidate = cost[prev_mask * m + k] + matrix.get(k + 1, j + 1);
                    if candidate < best {
                        best = candidate;
                        best_k = k as u8;
                    }
                }
                cost[mask * m + j] = best;
                parent[mask * m + j] = best_k;
            }
        }

        let full = states - 1;
        let mut last = 0;
        let mut best = f64::INFINITY;
        for j in 0..m {
            let candidate = cost[full * m + j] + matrix.get(j + 1, 0);
            if candidate < best {
                best = candidate;
                last = j;
            }
        }

        let mut order = Vec::with_capacity(n + 1);
        order.push(0);
        let mut mask = full;
        let mut current = last;
        loop {
            order.push(current + 1);
            let previous = parent[mask * m + current];
            mask &= !(1 << current);
            if previous == NO_PARENT {
                break;
            }
            current = previous as usize;
        }
        order.push(0);
        // Built back to front; reversing keeps the depot at both ends.
        order.reverse();

        debug!(stops = m, distance = best, "exact tour found");
        Ok(Tour::from_order(order, matrix, Algorithm::HeldKarp))
    }
}
