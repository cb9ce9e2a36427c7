//! Error types for the route planner.
//!
//! Only [`PlanningError`] reaches the consumer of a planning task. The other
//! errors are recovered inside the component that raises them and are logged.

use thiserror::Error;

use crate::matching::MatchingError;

/// A distance matrix that cannot be solved as given.
///
/// These are caller mistakes and are never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixError {
    #[error("distance matrix is empty")]
    Empty,
    #[error("distance matrix must be square: row {row} has length {len}, expected {expected}")]
    NotSquare { row: usize, len: usize, expected: usize },
    #[error("distance matrix contains negative value at [{row}][{col}]: {value}")]
    Negative { row: usize, col: usize, value: f64 },
    #[error("distance matrix contains a non-finite value at [{row}][{col}]")]
    NonFinite { row: usize, col: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error(transparent)]
    InvalidMatrix(#[from] MatrixError),
    #[error("need at least {needed} nodes, found {found}")]
    TooFewNodes { needed: usize, found: usize },
    #[error("{stops} stops exceed the exact solver limit of {limit}")]
    TooLargeForExact { stops: usize, limit: usize },
}

/// Failures inside the approximate solver. Always recovered by the
/// nearest-neighbour fallback.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApproximationError {
    #[error("matching failed: {0}")]
    Matching(#[from] MatchingError),
    #[error("vertex {0} has odd degree in the multigraph")]
    OddDegree(usize),
    #[error("eulerian circuit covered {visited} of {total} edges")]
    Disconnected { visited: usize, total: usize },
}

/// Failures talking to the road network service. Always recovered by
/// synthesising a complete graph over the input coordinates.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("network request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("network service returned status {status}")]
    Service { status: u16 },
    #[error("network service returned no road data")]
    EmptyNetwork,
    #[error("network service response could not be read: {0}")]
    Parse(String),
}

/// Cache read/write failures. Always treated as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache entry is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache entry holds an invalid geometry: {0}")]
    Geometry(String),
    #[error("cache entry has an unexpected shape: {0}")]
    Shape(String),
}

impl From<tempfile::PersistError> for CacheError {
    fn from(err: tempfile::PersistError) -> Self {
        CacheError::Io(err.error)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Terminal failure of a planning task.
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("no coordinates to plan")]
    NoCoordinates,
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("planning task panicked: {0}")]
    Panicked(String),
    #[error("planning task ended without a result")]
    WorkerLost,
}
