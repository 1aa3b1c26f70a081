use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use errgroup_vecstore::SimilarityIndex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assemble::assemble;
use crate::error::ClusterError;
use crate::rank::filter_and_rank;
use crate::resolver::{Resolution, ResolvedNeighbor, Resolver};
use crate::types::{Cluster, ErrorGroup, ErrorRecord, Params, validate_threshold};

/// Default upper bound for a single neighbor query.
pub(crate) const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Clusters error records by threshold similarity.
///
/// The engine keeps no state between runs; concurrent runs against the same
/// index are independent.
pub struct Engine {
    index: Arc<dyn SimilarityIndex>,
    query_timeout: Duration,
}

impl Engine {
    pub fn new(index: Arc<dyn SimilarityIndex>) -> Self {
        Self {
            index,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Sets the time budget of each neighbor query. A query that exceeds it
    /// counts as failed.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Clusters `records` and returns the groups with at least
    /// `params.min_group_size` members, largest first.
    ///
    /// `records` must all carry embeddings of one dimension and should be in
    /// ascending id order; the order decides which records become seeds.
    /// An empty input yields an empty list.
    pub async fn cluster(
        &self,
        records: &[ErrorRecord],
        params: &Params,
        cancel: &CancellationToken,
    ) -> Result<Vec<ErrorGroup>, ClusterError> {
        params.validate()?;
        if records.is_empty() {
            info!("no records to cluster");
            return Ok(vec![]);
        }

        let clusters = self.discover(records, params.threshold, cancel).await?;
        let groups: Vec<ErrorGroup> = clusters
            .iter()
            .enumerate()
            .map(|(i, c)| assemble(i + 1, c))
            .collect();
        let discovered = groups.len();
        let groups = filter_and_rank(groups, params.min_group_size);

        info!(
            threshold = params.threshold,
            min_group_size = params.min_group_size,
            records = records.len(),
            clusters = discovered,
            groups = groups.len(),
            "clustering complete"
        );
        Ok(groups)
    }

    /// Runs the traversal and returns the raw clusters in discovery order,
    /// before assembly and size filtering. Every input record appears in
    /// exactly one cluster.
    pub async fn discover<'a>(
        &self,
        records: &'a [ErrorRecord],
        threshold: f32,
        cancel: &CancellationToken,
    ) -> Result<Vec<Cluster<'a>>, ClusterError> {
        validate_threshold(threshold)?;

        let resolver = Resolver::new(self.index.as_ref(), records, self.query_timeout);
        let total = records.len();
        let mut visited: HashSet<u64> = HashSet::with_capacity(total);
        let mut clusters = Vec::new();
        let mut failures = 0usize;

        for record in records {
            if visited.contains(&record.id) {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(ClusterError::Cancelled {
                    visited: visited.len(),
                    total,
                });
            }
            visited.insert(record.id);

            let mut cluster = Cluster::new(record);
            let resolution = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ClusterError::Cancelled {
                        visited: visited.len(),
                        total,
                    });
                }
                r = resolver.resolve(record, threshold) => r,
            };

            match resolution {
                Resolution::Found(neighbors) => {
                    // Depth 1: neighbors are absorbed but never queried here.
                    for ResolvedNeighbor { record: neighbor, .. } in neighbors {
                        if visited.insert(neighbor.id) {
                            cluster.push(neighbor);
                        }
                    }
                }
                Resolution::Failed(err) => {
                    failures += 1;
                    warn!(id = record.id, error = %err, "neighbor query failed, continuing without neighbors");
                }
            }

            debug!(seed = record.id, size = cluster.len(), "cluster closed");
            clusters.push(cluster);
        }

        info!(
            records = total,
            clusters = clusters.len(),
            failed_queries = failures,
            "traversal complete"
        );
        Ok(clusters)
    }

    /// Returns up to `top_k` records of the snapshot most similar to
    /// `source`, with their scores.
    pub async fn similar_to<'a>(
        &self,
        source: &ErrorRecord,
        records: &'a [ErrorRecord],
        top_k: usize,
        threshold: f32,
    ) -> Result<Resolution<'a>, ClusterError> {
        validate_threshold(threshold)?;
        let resolver = Resolver::new(self.index.as_ref(), records, self.query_timeout);
        Ok(resolver.similar_to(source, top_k, threshold).await)
    }
}
