use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClusterError;

/// ErrorRecord is one logged error occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Unique identifier. Also the tie-breaker for iteration order.
    pub id: u64,

    /// Classification of the error (e.g. "NullPointerException").
    pub error_type: String,

    /// Human-readable error message.
    pub message: String,

    /// Severity label, e.g. "ERROR", "WARN", "CRITICAL".
    pub severity: String,

    /// When the error occurred.
    pub timestamp: DateTime<Utc>,

    /// Application that reported the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,

    /// Deployment environment (e.g. "prod", "staging").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    /// Semantic embedding of the error. Records without one are not clustered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl ErrorRecord {
    pub fn new(
        id: u64,
        error_type: &str,
        message: &str,
        severity: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            error_type: error_type.to_string(),
            message: message.to_string(),
            severity: severity.to_string(),
            timestamp,
            application: None,
            environment: None,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_application(mut self, application: &str, environment: &str) -> Self {
        self.application = Some(application.to_string());
        self.environment = Some(environment.to_string());
        self
    }
}

/// Parameters of one clustering run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Params {
    /// Minimum similarity for two records to be connected, in (0, 1].
    pub threshold: f32,

    /// Groups with fewer members are dropped from the result. At least 1.
    pub min_group_size: usize,
}

impl Params {
    /// Rejects out-of-range parameters. Values are never clamped.
    pub fn validate(&self) -> Result<(), ClusterError> {
        validate_threshold(self.threshold)?;
        if self.min_group_size < 1 {
            return Err(ClusterError::InvalidMinGroupSize(self.min_group_size));
        }
        Ok(())
    }
}

pub(crate) fn validate_threshold(threshold: f32) -> Result<(), ClusterError> {
    // NaN fails both comparisons.
    if threshold > 0.0 && threshold <= 1.0 {
        Ok(())
    } else {
        Err(ClusterError::InvalidThreshold(threshold))
    }
}

/// Cluster is the raw output of one seed expansion: the seed followed by the
/// neighbors it absorbed, in insertion order. Never empty.
#[derive(Debug, Clone)]
pub struct Cluster<'a> {
    members: Vec<&'a ErrorRecord>,
}

impl<'a> Cluster<'a> {
    pub(crate) fn new(seed: &'a ErrorRecord) -> Self {
        Self {
            members: vec![seed],
        }
    }

    pub(crate) fn push(&mut self, record: &'a ErrorRecord) {
        self.members.push(record);
    }

    /// The record that started this cluster.
    pub fn seed(&self) -> &'a ErrorRecord {
        self.members[0]
    }

    pub fn members(&self) -> &[&'a ErrorRecord] {
        &self.members
    }

    pub fn ids(&self) -> Vec<u64> {
        self.members.iter().map(|r| r.id).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// ErrorGroup is a reportable cluster of similar errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorGroup {
    /// Sequence number within one run, starting at 1 in discovery order.
    /// Not stable across runs.
    pub id: usize,

    /// "{representative type} - {count} occurrences".
    pub name: String,

    pub representative_type: String,
    pub representative_message: String,

    /// Members in cluster insertion order; the representative comes first.
    pub members: Vec<ErrorRecord>,

    /// Always equal to `members.len()`.
    pub count: usize,

    /// Mean pairwise cosine similarity of the members; 1.0 for a singleton.
    pub avg_similarity: f32,

    /// Most frequent member severity.
    pub severity: String,
}

impl ErrorGroup {
    /// Display identifier, e.g. "GROUP-3".
    pub fn group_id(&self) -> String {
        format!("GROUP-{}", self.id)
    }

    pub fn member_ids(&self) -> Vec<u64> {
        self.members.iter().map(|r| r.id).collect()
    }
}
