use std::cmp::Reverse;

use crate::types::ErrorGroup;

/// Drops groups smaller than `min_group_size` and orders the rest by member
/// count, largest first. Equal counts keep their input (discovery) order.
pub fn filter_and_rank(mut groups: Vec<ErrorGroup>, min_group_size: usize) -> Vec<ErrorGroup> {
    groups.retain(|g| g.count >= min_group_size);
    // sort_by_key is stable.
    groups.sort_by_key(|g| Reverse(g.count));
    groups
}
