//! Christofides-style approximate tour.
//!
//! Minimum spanning tree, minimum-weight perfect matching on the odd-degree
//! vertices, Eulerian circuit of the union, then shortcut repeated vertices.
//! Within 1.5x of optimal when the matrix satisfies the triangle inequality.
//! Any failure in matching or circuit extraction falls back to
//! [`NearestNeighbor`].

use petgraph::algo::min_spanning_tree;
use petgraph::data::Element;
use petgraph::graph::UnGraph;
use tracing::{debug, warn};

use crate::error::{ApproximationError, SolverError};
use crate::matching::max_weight_perfect_matching;
use crate::matrix::DistanceMatrix;
use crate::solver::{Algorithm, NearestNeighbor, Tour};
use crate::traits::TourSolver;

#[derive(Debug, Clone, Copy, Default)]
pub struct Christofides;

impl TourSolver for Christofides {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Christofides
    }

    fn solve(&self, matrix: &DistanceMatrix) -> Result<Tour, SolverError> {
        let n = matrix.len();
        if n < 2 {
            return Err(SolverError::TooFewNodes { needed: 2, found: n });
        }

        match approximate(matrix) {
            Ok(order) => Ok(Tour::from_order(order, matrix, Algorithm::Christofides)),
            Err(err) => {
                warn!(error = %err, "approximation failed, using nearest neighbour");
                NearestNeighbor.solve(matrix)
            }
        }
    }
}

fn approximate(matrix: &DistanceMatrix) -> Result<Vec<usize>, ApproximationError> {
    let n = matrix.len();
    let tree = spanning_tree(matrix);

    let mut degree = vec![0usize; n];
    for &(u, v) in &tree {
        degree[u] += 1;
        degree[v] += 1;
    }
    let odd: Vec<usize> = (0..n).filter(|&v| degree[v] % 2 == 1).collect();

    // The primitive maximises, so flip distances around an offset that keeps
    // every weight positive.
    let offset = odd
        .iter()
        .flat_map(|&a| odd.iter().map(move |&b| (a, b)))
        .map(|(a, b)| matrix.get(a, b))
        .fold(0.0, f64::max)
        + 1.0;
    let matching = max_weight_perfect_matching(&odd, |a, b| offset - matrix.get(a, b))?;
    debug!(
        tree_edges = tree.len(),
        odd = odd.len(),
        matched = matching.len(),
        "built christofides multigraph"
    );

    let mut edges = tree;
    edges.extend(matching);
    let circuit = eulerian_circuit(n, &edges, 0)?;

    Ok(shortcut(n, &circuit))
}

fn spanning_tree(matrix: &DistanceMatrix) -> Vec<(usize, usize)> {
    let n = matrix.len();
    let mut graph = UnGraph::<(), f64>::with_capacity(n, n * (n - 1) / 2);
    let nodes: Vec<_> = (0..n).map(|_| graph.add_node(())).collect();
    for i in 0..n {
        for j in i + 1..n {
            graph.add_edge(nodes[i], nodes[j], matrix.get(i, j));
        }
    }

    min_spanning_tree(&graph)
        .filter_map(|element| match element {
            Element::Edge { source, target, .. } => Some((source, target)),
            Element::Node { .. } => None,
        })
        .collect()
}

/// Hierholzer's algorithm over a multigraph given as an edge list.
fn eulerian_circuit(
    n: usize,
    edges: &[(usize, usize)],
    start: usize,
) -> Result<Vec<usize>, ApproximationError> {
    let mut adjacency: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n];
    for (id, &(u, v)) in edges.iter().enumerate() {
        adjacency[u].push((v, id));
        adjacency[v].push((u, id));
    }
    if let Some(vertex) = (0..n).find(|&v| adjacency[v].len() % 2 == 1) {
        return Err(ApproximationError::OddDegree(vertex));
    }

    let mut used = vec![false; edges.len()];
    let mut cursor = vec![0usize; n];
    let mut stack = vec![start];
    let mut circuit = Vec::with_capacity(edges.len() + 1);

    while let Some(&vertex) = stack.last() {
        let mut next = None;
        while cursor[vertex] < adjacency[vertex].len() {
            let (to, id) = adjacency[vertex][cursor[vertex]];
            cursor[vertex] += 1;
            if !used[id] {
                used[id] = true;
                next = Some(to);
                break;
            }
        }
        match next {
            Some(to) => stack.push(to),
            None => {
                circuit.push(vertex);
                stack.pop();
            }
        }
    }

    let visited = circuit.len().saturating_sub(1);
    if visited != edges.len() {
        return Err(ApproximationError::Disconnected {
            visited,
            total: edges.len(),
        });
    }
    circuit.reverse();
    Ok(circuit)
}

/// Keeps the first visit of every vertex and closes the tour at the depot.
fn shortcut(n: usize, circuit: &[usize]) -> Vec<usize> {
    let mut seen = vec![false; n];
    let mut order = Vec::with_capacity(n + 1);
    for &vertex in circuit {
        if !seen[vertex] {
            seen[vertex] = true;
            order.push(vertex);
        }
    }
    order.push(0);
    order
}
