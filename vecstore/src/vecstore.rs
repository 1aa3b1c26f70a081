use crate::error::VecError;

/// Neighbor is a single result from a threshold similarity search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Identifier of the matched vector.
    pub id: u64,

    /// Cosine similarity between the query and matched vector.
    /// Higher values indicate closer vectors.
    pub similarity: f32,
}

/// SimilarityIndex is the interface for threshold similarity search over
/// dense float32 vectors.
///
/// A store backed by a database (e.g. pgvector) or a remote service
/// implements this trait; [`MemoryIndex`](crate::MemoryIndex) is the
/// brute-force in-process implementation.
///
/// All implementations must be safe for concurrent use (Send + Sync).
#[async_trait::async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Add or update a vector with the given ID.
    async fn insert(&self, id: u64, vector: &[f32]) -> Result<(), VecError>;

    /// Add or update multiple vectors at once.
    /// `ids` and `vectors` must have the same length.
    async fn batch_insert(&self, ids: &[u64], vectors: &[&[f32]]) -> Result<(), VecError>;

    /// Return every stored vector whose similarity to `query` is at least
    /// `threshold` (inclusive), ordered by descending similarity.
    ///
    /// The vector stored under `exclude` is never part of the result.
    async fn within_threshold(
        &self,
        query: &[f32],
        exclude: u64,
        threshold: f32,
    ) -> Result<Vec<Neighbor>, VecError>;

    /// Remove a vector by ID. No error if ID does not exist.
    async fn delete(&self, id: u64) -> Result<(), VecError>;
}
