use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VecError {
    #[error("vecstore: dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },

    #[error("vecstore: batch length mismatch: {ids} ids, {vectors} vectors")]
    BatchLengthMismatch { ids: usize, vectors: usize },

    #[error("vecstore: {0}")]
    Io(String),

    #[error("vecstore: invalid vector: {0}")]
    InvalidFormat(String),

    #[error("vecstore: store unavailable: {0}")]
    Unavailable(String),

    #[error("vecstore: query timed out after {0}ms")]
    Timeout(u64),
}
