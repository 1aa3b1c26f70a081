use std::collections::HashMap;
use std::time::Duration;

use errgroup_vecstore::{SimilarityIndex, VecError};
use tracing::debug;

use crate::types::ErrorRecord;

/// A neighbor joined back to its record in the current snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedNeighbor<'a> {
    pub record: &'a ErrorRecord,
    pub similarity: f32,
}

/// Outcome of one neighbor query.
#[derive(Debug)]
pub enum Resolution<'a> {
    /// Neighbors in the store's order (descending similarity).
    Found(Vec<ResolvedNeighbor<'a>>),

    /// The store failed or did not answer within the query timeout.
    Failed(VecError),
}

/// Resolver queries a [`SimilarityIndex`] on behalf of one snapshot of
/// records and maps the returned IDs back to those records.
///
/// Matches whose ID is not part of the snapshot are dropped.
pub struct Resolver<'i, 'a> {
    index: &'i dyn SimilarityIndex,
    records: HashMap<u64, &'a ErrorRecord>,
    timeout: Duration,
}

impl<'i, 'a> Resolver<'i, 'a> {
    pub fn new(index: &'i dyn SimilarityIndex, records: &'a [ErrorRecord], timeout: Duration) -> Self {
        Self {
            index,
            records: records.iter().map(|r| (r.id, r)).collect(),
            timeout,
        }
    }

    /// Returns every snapshot record with similarity >= `threshold` to
    /// `source`, excluding `source` itself.
    ///
    /// A record without an embedding is not queried and has no neighbors.
    pub async fn resolve(&self, source: &ErrorRecord, threshold: f32) -> Resolution<'a> {
        let Some(embedding) = source.embedding.as_deref() else {
            return Resolution::Found(vec![]);
        };

        let query = self.index.within_threshold(embedding, source.id, threshold);
        let matches = match tokio::time::timeout(self.timeout, query).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => return Resolution::Failed(e),
            Err(_) => return Resolution::Failed(VecError::Timeout(self.timeout.as_millis() as u64)),
        };

        let mut resolved = Vec::with_capacity(matches.len());
        for m in matches {
            match self.records.get(&m.id) {
                Some(&record) => resolved.push(ResolvedNeighbor {
                    record,
                    similarity: m.similarity,
                }),
                None => debug!(source = source.id, id = m.id, "dropping match outside snapshot"),
            }
        }
        Resolution::Found(resolved)
    }

    /// Returns at most `top_k` of the most similar records to `source`.
    pub async fn similar_to(&self, source: &ErrorRecord, top_k: usize, threshold: f32) -> Resolution<'a> {
        match self.resolve(source, threshold).await {
            Resolution::Found(mut neighbors) => {
                neighbors.truncate(top_k);
                Resolution::Found(neighbors)
            }
            failed => failed,
        }
    }
}
