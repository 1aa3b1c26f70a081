//! Groups error records into clusters of semantically similar errors.
//!
//! Every record carries an embedding. A run walks the records in ascending id
//! order; each record not yet assigned seeds a new cluster and absorbs the
//! unassigned records a [`SimilarityIndex`] reports at or above the
//! similarity threshold. Clusters become [`ErrorGroup`]s, are filtered by a
//! minimum size and ranked largest first.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use errgroup_cluster::{Engine, Params};
//! use errgroup_vecstore::MemoryIndex;
//! use tokio_util::sync::CancellationToken;
//!
//! let index = Arc::new(MemoryIndex::new());
//! // ... insert every record's embedding under its id ...
//! let engine = Engine::new(index);
//! let params = Params { threshold: 0.75, min_group_size: 2 };
//! let groups = engine.cluster(&records, &params, &CancellationToken::new()).await?;
//! ```
//!
//! # Design
//!
//! Only the seed's direct neighbors join its cluster. A record that is close
//! to a member but not to the seed stays unassigned and seeds a later
//! cluster. A failed neighbor query leaves the seed without neighbors and the
//! run continues; cancelling the run yields [`ClusterError::Cancelled`].
//!
//! [`SimilarityIndex`]: errgroup_vecstore::SimilarityIndex

mod assemble;
mod config;
mod engine;
mod error;
mod rank;
mod resolver;
mod service;
mod source;
mod stats;
mod types;

pub use assemble::{assemble, average_pairwise_similarity, dominant_severity};
pub use config::Config;
pub use engine::Engine;
pub use error::ClusterError;
pub use rank::filter_and_rank;
pub use resolver::{Resolution, ResolvedNeighbor, Resolver};
pub use service::{GroupingService, prepare};
pub use source::{MemorySource, RecordSource};
pub use stats::GroupingStats;
pub use types::{Cluster, ErrorGroup, ErrorRecord, Params};
