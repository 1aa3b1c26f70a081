use thiserror::Error;

/// Errors returned by clustering operations.
///
/// A failed neighbor query is not an error: the run treats it as a record
/// without neighbors and continues.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster: similarity threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f32),

    #[error("cluster: min group size must be at least 1, got {0}")]
    InvalidMinGroupSize(usize),

    #[error("cluster: time window must not be negative, got {seconds}s")]
    InvalidWindow { seconds: i64 },

    #[error("cluster: record {id} has dimension {got}, expected {expected}")]
    DimensionMismatch { id: u64, expected: usize, got: usize },

    #[error("cluster: cancelled after visiting {visited} of {total} records")]
    Cancelled { visited: usize, total: usize },

    #[error("cluster: record source error: {0}")]
    Source(String),

    #[error("cluster: config error: {0}")]
    Config(String),
}
