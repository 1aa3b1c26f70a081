use errgroup_vecstore::cosine_similarity;

use crate::types::{Cluster, ErrorGroup, ErrorRecord};

/// Severity reported for a group without members.
const FALLBACK_SEVERITY: &str = "ERROR";

/// Builds the reportable group for a cluster. `number` is the group's
/// position in discovery order, starting at 1.
pub fn assemble(number: usize, cluster: &Cluster<'_>) -> ErrorGroup {
    let members = cluster.members();
    let representative = cluster.seed();

    ErrorGroup {
        id: number,
        name: format!("{} - {} occurrences", representative.error_type, members.len()),
        representative_type: representative.error_type.clone(),
        representative_message: representative.message.clone(),
        members: members.iter().map(|&r| r.clone()).collect(),
        count: members.len(),
        avg_similarity: average_pairwise_similarity(members),
        severity: dominant_severity(members),
    }
}

/// Returns the most frequent severity among `members`.
///
/// On equal counts the severity seen first in member order wins.
pub fn dominant_severity(members: &[&ErrorRecord]) -> String {
    // (severity, count) in first-seen order.
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for m in members {
        match counts.iter_mut().find(|(s, _)| *s == m.severity) {
            Some((_, n)) => *n += 1,
            None => counts.push((m.severity.as_str(), 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (severity, n) in counts {
        if best.is_none_or(|(_, top)| n > top) {
            best = Some((severity, n));
        }
    }
    best.map(|(s, _)| s).unwrap_or(FALLBACK_SEVERITY).to_string()
}

/// Mean cosine similarity over all unordered member pairs.
///
/// A single member (or none) yields 1.0. A member without an embedding
/// contributes 0 to each of its pairs.
pub fn average_pairwise_similarity(members: &[&ErrorRecord]) -> f32 {
    let n = members.len();
    if n < 2 {
        return 1.0;
    }

    let mut sum: f64 = 0.0;
    for i in 0..n {
        let a = members[i].embedding.as_deref().unwrap_or_default();
        for b in &members[i + 1..] {
            let b = b.embedding.as_deref().unwrap_or_default();
            sum += cosine_similarity(a, b) as f64;
        }
    }
    let pairs = (n * (n - 1) / 2) as f64;
    (sum / pairs) as f32
}
