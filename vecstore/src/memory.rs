use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::cosine::cosine_similarity;
use crate::error::VecError;
use crate::vecstore::{Neighbor, SimilarityIndex};

/// MemoryIndex is an in-memory SimilarityIndex using brute-force cosine
/// similarity. Intended for testing and small-scale use (< 10k vectors).
///
/// The dimension is fixed by the first inserted vector; later inserts and
/// queries of a different length are rejected.
pub struct MemoryIndex {
    inner: RwLock<Inner>,
}

struct Inner {
    dim: Option<usize>,
    vectors: BTreeMap<u64, Vec<f32>>,
}

impl Inner {
    fn check_dim(&self, got: usize) -> Result<(), VecError> {
        match self.dim {
            Some(want) if want != got => Err(VecError::DimensionMismatch { got, want }),
            _ => Ok(()),
        }
    }

    /// Checks `vector` against the index dimension, or against `vector`'s
    /// own length when the index is still empty.
    fn check(&self, id: u64, vector: &[f32]) -> Result<(), VecError> {
        if vector.is_empty() {
            return Err(VecError::InvalidFormat("empty vector".into()));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(VecError::InvalidFormat(format!(
                "vector {id} contains a non-finite value"
            )));
        }
        self.check_dim(vector.len())
    }

    fn put(&mut self, id: u64, vector: &[f32]) {
        self.dim = Some(vector.len());
        self.vectors.insert(id, vector.to_vec());
    }
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                dim: None,
                vectors: BTreeMap::new(),
            }),
        }
    }

    /// Return the vector dimension, or None before the first insert.
    pub fn dimension(&self) -> Option<usize> {
        self.inner.read().dim
    }

    /// Return the number of vectors in the index.
    pub fn len(&self) -> usize {
        self.inner.read().vectors.len()
    }

    /// Return true if the index contains no vectors.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SimilarityIndex for MemoryIndex {
    async fn insert(&self, id: u64, vector: &[f32]) -> Result<(), VecError> {
        let mut inner = self.inner.write();
        inner.check(id, vector)?;
        inner.put(id, vector);
        Ok(())
    }

    async fn batch_insert(&self, ids: &[u64], vectors: &[&[f32]]) -> Result<(), VecError> {
        if ids.len() != vectors.len() {
            return Err(VecError::BatchLengthMismatch {
                ids: ids.len(),
                vectors: vectors.len(),
            });
        }
        let mut inner = self.inner.write();
        // All or nothing: the first vector fixes the dimension of an empty
        // index, so every vector is checked against that before any insert.
        let want = inner.dim.or_else(|| vectors.first().map(|v| v.len()));
        for (&id, vec) in ids.iter().zip(vectors.iter()) {
            inner.check(id, vec)?;
            match want {
                Some(want) if vec.len() != want => {
                    return Err(VecError::DimensionMismatch { got: vec.len(), want });
                }
                _ => {}
            }
        }
        for (&id, vec) in ids.iter().zip(vectors.iter()) {
            inner.put(id, vec);
        }
        Ok(())
    }

    async fn within_threshold(
        &self,
        query: &[f32],
        exclude: u64,
        threshold: f32,
    ) -> Result<Vec<Neighbor>, VecError> {
        let inner = self.inner.read();
        if inner.vectors.is_empty() {
            return Ok(vec![]);
        }
        inner.check_dim(query.len())?;

        // BTreeMap iteration is ascending by id; the stable sort keeps that
        // order among equal similarities.
        let mut results: Vec<Neighbor> = inner
            .vectors
            .iter()
            .filter(|(id, _)| **id != exclude)
            .map(|(&id, vec)| Neighbor {
                id,
                similarity: cosine_similarity(query, vec),
            })
            .filter(|n| n.similarity >= threshold)
            .collect();

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(results)
    }

    async fn delete(&self, id: u64) -> Result<(), VecError> {
        let mut inner = self.inner.write();
        inner.vectors.remove(&id);
        if inner.vectors.is_empty() {
            inner.dim = None;
        }
        Ok(())
    }
}
