use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::ClusterError;
use crate::types::ErrorRecord;

/// Supplies snapshots of error records to cluster.
///
/// Implementations must be safe for concurrent use.
/// Use [`MemorySource`] for in-memory storage (testing/ephemeral).
#[async_trait::async_trait]
pub trait RecordSource: Send + Sync {
    /// Returns every record.
    async fn all(&self) -> Result<Vec<ErrorRecord>, ClusterError>;

    /// Returns records whose timestamp is at or after `since`.
    async fn since(&self, since: DateTime<Utc>) -> Result<Vec<ErrorRecord>, ClusterError>;
}

/// In-memory [`RecordSource`] keyed by record id.
/// Snapshots come back in ascending id order.
pub struct MemorySource {
    records: RwLock<BTreeMap<u64, ErrorRecord>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Stores a record, replacing any record with the same id.
    pub fn put(&self, record: ErrorRecord) {
        self.records.write().insert(record.id, record);
    }

    pub fn extend(&self, records: impl IntoIterator<Item = ErrorRecord>) {
        let mut map = self.records.write();
        for r in records {
            map.insert(r.id, r);
        }
    }

    pub fn get(&self, id: u64) -> Option<ErrorRecord> {
        self.records.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RecordSource for MemorySource {
    async fn all(&self) -> Result<Vec<ErrorRecord>, ClusterError> {
        Ok(self.records.read().values().cloned().collect())
    }

    async fn since(&self, since: DateTime<Utc>) -> Result<Vec<ErrorRecord>, ClusterError> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.timestamp >= since)
            .cloned()
            .collect())
    }
}
