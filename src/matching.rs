//! Maximum-weight perfect matching on a complete graph.
//!
//! Exact for small vertex sets (bitmask DP), greedy with pair-exchange
//! improvement above [`EXACT_MATCHING_LIMIT`].

use thiserror::Error;

/// Largest vertex count matched exactly.
pub const EXACT_MATCHING_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchingError {
    #[error("cannot perfectly match {0} vertices")]
    OddVertexCount(usize),
    #[error("weight between {0} and {1} is not finite")]
    NonFiniteWeight(usize, usize),
}

/// Pairs up every vertex so the total `weight` is as large as possible.
///
/// Returned pairs hold vertex ids from `vertices`.
pub fn max_weight_perfect_matching<F>(
    vertices: &[usize],
    weight: F,
) -> Result<Vec<(usize, usize)>, MatchingError>
where
    F: Fn(usize, usize) -> f64,
{
    let n = vertices.len();
    if n % 2 == 1 {
        return Err(MatchingError::OddVertexCount(n));
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut weights = vec![vec![0.0; n]; n];
    for a in 0..n {
        for b in a + 1..n {
            let w = weight(vertices[a], vertices[b]);
            if !w.is_finite() {
                return Err(MatchingError::NonFiniteWeight(vertices[a], vertices[b]));
            }
            weights[a][b] = w;
            weights[b][a] = w;
        }
    }

    let pairs = if n <= EXACT_MATCHING_LIMIT {
        exact(&weights)
    } else {
        improve(&weights, greedy(&weights))
    };

    Ok(pairs
        .into_iter()
        .map(|(a, b)| (vertices[a], vertices[b]))
        .collect())
}

/// `best[mask]` is the best matching of the vertices in `mask`; the lowest
/// vertex of each mask is always paired first, so every mask is solved once.
fn exact(weights: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let n = weights.len();
    let full = (1usize << n) - 1;
    let mut best = vec![f64::NEG_INFINITY; 1 << n];
    let mut choice = vec![usize::MAX; 1 << n];
    best[0] = 0.0;

    for mask in 1..=full {
        if mask.count_ones() % 2 == 1 {
            continue;
        }
        let a = mask.trailing_zeros() as usize;
        let rest = mask & !(1 << a);
        let mut bits = rest;
        while bits != 0 {
            let b = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            let sub = rest & !(1 << b);
            let value = best[sub] + weights[a][b];
            if value > best[mask] {
                best[mask] = value;
                choice[mask] = b;
            }
        }
    }

    let mut pairs = Vec::with_capacity(n / 2);
    let mut mask = full;
    while mask != 0 {
        let a = mask.trailing_zeros() as usize;
        let b = choice[mask];
        pairs.push((a, b));
        mask &= !(1 << a) & !(1 << b);
    }
    pairs
}

fn greedy(weights: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let n = weights.len();
    let mut edges: Vec<(usize, usize)> = (0..n)
        .flat_map(|a| (a + 1..n).map(move |b| (a, b)))
        .collect();
    edges.sort_by(|x, y| weights[y.0][y.1].total_cmp(&weights[x.0][x.1]));

    let mut matched = vec![false; n];
    let mut pairs = Vec::with_capacity(n / 2);
    for (a, b) in edges {
        if !matched[a] && !matched[b] {
            matched[a] = true;
            matched[b] = true;
            pairs.push((a, b));
        }
    }
    pairs
}

/// Swaps partners between two pairs while that raises the total.
fn improve(weights: &[Vec<f64>], mut pairs: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    const EPSILON: f64 = 1e-9;
    let mut improved = true;
    while improved {
        improved = false;
        for i in 0..pairs.len() {
            for j in i + 1..pairs.len() {
                let (a, b) = pairs[i];
                let (c, d) = pairs[j];
                let current = weights[a][b] + weights[c][d];
                let crossed = weights[a][c] + weights[b][d];
                let swapped = weights[a][d] + weights[b][c];
                if crossed > current + EPSILON && crossed >= swapped {
                    pairs[i] = (a, c);
                    pairs[j] = (b, d);
                    improved = true;
                } else if swapped > current + EPSILON {
                    pairs[i] = (a, d);
                    pairs[j] = (b, c);
                    improved = true;
                }
            }
        }
    }
    pairs
}
