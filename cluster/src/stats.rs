use serde::Serialize;

use crate::types::ErrorGroup;

/// Summary of a grouping run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupingStats {
    pub total_groups: usize,
    pub total_errors_clustered: usize,
    pub largest_group_size: usize,
    /// 0 when there are no groups.
    pub average_group_size: f64,
}

impl GroupingStats {
    pub fn from_groups(groups: &[ErrorGroup]) -> Self {
        if groups.is_empty() {
            return Self::default();
        }
        let total: usize = groups.iter().map(|g| g.count).sum();
        Self {
            total_groups: groups.len(),
            total_errors_clustered: total,
            largest_group_size: groups.iter().map(|g| g.count).max().unwrap_or(0),
            average_group_size: total as f64 / groups.len() as f64,
        }
    }
}
