use std::sync::Arc;

use chrono::{DateTime, Utc};
use errgroup_vecstore::SimilarityIndex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::ClusterError;
use crate::source::RecordSource;
use crate::stats::GroupingStats;
use crate::types::{ErrorGroup, ErrorRecord, Params};

/// Groups the errors of a [`RecordSource`] whose embeddings are held in a
/// [`SimilarityIndex`].
///
/// This is the boundary in front of [`Engine`]: it takes the snapshot,
/// keeps only records with embeddings, fixes the iteration order and checks
/// parameters and dimensions before the engine runs.
pub struct GroupingService {
    source: Arc<dyn RecordSource>,
    engine: Engine,
    config: Config,
}

impl GroupingService {
    pub fn new(source: Arc<dyn RecordSource>, index: Arc<dyn SimilarityIndex>, config: Config) -> Self {
        let config = config.with_defaults();
        let engine = Engine::new(index).with_query_timeout(config.query_timeout());
        Self {
            source,
            engine,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Groups the errors of the last `window`.
    pub async fn group_recent(
        &self,
        params: &Params,
        window: chrono::Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<ErrorGroup>, ClusterError> {
        if window < chrono::Duration::zero() {
            return Err(ClusterError::InvalidWindow {
                seconds: window.num_seconds(),
            });
        }
        // A window reaching past the representable range covers everything.
        let since = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.group_since(params, since, cancel).await
    }

    /// Groups the errors that occurred at or after `since`.
    pub async fn group_since(
        &self,
        params: &Params,
        since: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ErrorGroup>, ClusterError> {
        params.validate()?;
        let records = prepare(self.source.since(since).await?)?;
        info!(
            since = %since,
            records = records.len(),
            "grouping recent errors with embeddings"
        );
        self.engine.cluster(&records, params, cancel).await
    }

    /// Groups every error regardless of age.
    pub async fn group_all(
        &self,
        params: &Params,
        cancel: &CancellationToken,
    ) -> Result<Vec<ErrorGroup>, ClusterError> {
        params.validate()?;
        let records = prepare(self.source.all().await?)?;
        info!(records = records.len(), "grouping all errors with embeddings");
        self.engine.cluster(&records, params, cancel).await
    }

    /// Summarizes a grouping of the last `window` that keeps singletons.
    pub async fn statistics(
        &self,
        threshold: f32,
        window: chrono::Duration,
        cancel: &CancellationToken,
    ) -> Result<GroupingStats, ClusterError> {
        let params = Params {
            threshold,
            min_group_size: 1,
        };
        let groups = self.group_recent(&params, window, cancel).await?;
        Ok(GroupingStats::from_groups(&groups))
    }

    /// Runs [`group_recent`](Self::group_recent) with the configured
    /// parameters and window.
    pub async fn group_recent_default(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ErrorGroup>, ClusterError> {
        self.group_recent(&self.config.params(), self.config.window(), cancel)
            .await
    }
}

/// Drops records without an embedding, sorts the rest by ascending id and
/// checks that all embeddings share one dimension.
pub fn prepare(mut records: Vec<ErrorRecord>) -> Result<Vec<ErrorRecord>, ClusterError> {
    records.retain(|r| r.embedding.is_some());
    records.sort_by_key(|r| r.id);

    let mut expected: Option<usize> = None;
    for r in &records {
        let got = r.embedding.as_ref().map_or(0, Vec::len);
        match expected {
            None => expected = Some(got),
            Some(want) if want != got => {
                return Err(ClusterError::DimensionMismatch {
                    id: r.id,
                    expected: want,
                    got,
                });
            }
            Some(_) => {}
        }
    }
    Ok(records)
}
