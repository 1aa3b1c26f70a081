use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use errgroup_cluster::{ClusterError, Engine, ErrorGroup, ErrorRecord, Params};
use errgroup_vecstore::{MemoryIndex, Neighbor, SimilarityIndex, VecError};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Scripted index: answers from a fixed similarity table
// ---------------------------------------------------------------------------

/// Returns pairwise scores from a table instead of computing them. Pairs not
/// in the table score 0.1.
#[derive(Default)]
struct ScriptedIndex {
    scores: HashMap<(u64, u64), f32>,
    failing: HashSet<u64>,
    stalled: HashSet<u64>,
}

impl ScriptedIndex {
    fn with_scores(pairs: &[(u64, u64, f32)]) -> Self {
        let mut idx = Self::default();
        for &(a, b, s) in pairs {
            idx.scores.insert((a, b), s);
            idx.scores.insert((b, a), s);
        }
        idx
    }

    fn fail_on(mut self, id: u64) -> Self {
        self.failing.insert(id);
        self
    }

    fn stall_on(mut self, id: u64) -> Self {
        self.stalled.insert(id);
        self
    }

    fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.scores.keys().map(|&(a, _)| a).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[async_trait::async_trait]
impl SimilarityIndex for ScriptedIndex {
    async fn insert(&self, _: u64, _: &[f32]) -> Result<(), VecError> {
        Ok(())
    }

    async fn batch_insert(&self, _: &[u64], _: &[&[f32]]) -> Result<(), VecError> {
        Ok(())
    }

    async fn within_threshold(
        &self,
        _query: &[f32],
        exclude: u64,
        threshold: f32,
    ) -> Result<Vec<Neighbor>, VecError> {
        if self.failing.contains(&exclude) {
            return Err(VecError::Io(format!("query for {exclude} failed")));
        }
        if self.stalled.contains(&exclude) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        let mut out: Vec<Neighbor> = self
            .ids()
            .into_iter()
            .filter(|&id| id != exclude)
            .map(|id| Neighbor {
                id,
                similarity: self.scores.get(&(exclude, id)).copied().unwrap_or(0.1),
            })
            .filter(|n| n.similarity >= threshold)
            .collect();
        out.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
        Ok(out)
    }

    async fn delete(&self, _: u64) -> Result<(), VecError> {
        Ok(())
    }
}

fn ts() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn records(ids: &[u64]) -> Vec<ErrorRecord> {
    ids.iter()
        .map(|&id| {
            ErrorRecord::new(id, &format!("E{id}"), "boom", "ERROR", ts()).with_embedding(vec![1.0])
        })
        .collect()
}

/// sim(E1,E2)=0.9, sim(E1,E3)=0.5, sim(E1,E4)=0.3, sim(E2,E3)=0.2,
/// sim(E3,E4)=0.95, everything else 0.1.
fn four_errors() -> ScriptedIndex {
    ScriptedIndex::with_scores(&[
        (1, 2, 0.9),
        (1, 3, 0.5),
        (1, 4, 0.3),
        (2, 3, 0.2),
        (3, 4, 0.95),
        (2, 4, 0.1),
    ])
}

fn member_ids(groups: &[ErrorGroup]) -> Vec<Vec<u64>> {
    groups.iter().map(|g| g.member_ids()).collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_pairs_at_point_eight() {
    let engine = Engine::new(Arc::new(four_errors()));
    let recs = records(&[1, 2, 3, 4]);
    let params = Params { threshold: 0.8, min_group_size: 2 };

    let groups = engine
        .cluster(&recs, &params, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(member_ids(&groups), vec![vec![1, 2], vec![3, 4]]);
    assert_eq!(groups[0].id, 1);
    assert_eq!(groups[1].id, 2);
    assert_eq!(groups[0].name, "E1 - 2 occurrences");
    assert_eq!(groups[1].representative_type, "E3");
}

#[tokio::test]
async fn nothing_qualifies_at_point_nine_six() {
    let engine = Engine::new(Arc::new(four_errors()));
    let recs = records(&[1, 2, 3, 4]);
    let cancel = CancellationToken::new();

    let clusters = engine.discover(&recs, 0.96, &cancel).await.unwrap();
    assert_eq!(clusters.len(), 4);
    assert!(clusters.iter().all(|c| c.len() == 1));

    let params = Params { threshold: 0.96, min_group_size: 2 };
    let groups = engine.cluster(&recs, &params, &cancel).await.unwrap();
    assert!(groups.is_empty());

    let params = Params { threshold: 0.96, min_group_size: 1 };
    let groups = engine.cluster(&recs, &params, &cancel).await.unwrap();
    assert_eq!(member_ids(&groups), vec![vec![1], vec![2], vec![3], vec![4]]);
}

#[tokio::test]
async fn failed_query_is_fail_open() {
    let engine = Engine::new(Arc::new(four_errors().fail_on(1)));
    let recs = records(&[1, 2, 3, 4]);
    let params = Params { threshold: 0.8, min_group_size: 1 };

    let groups = engine
        .cluster(&recs, &params, &CancellationToken::new())
        .await
        .unwrap();

    // E1 seeds a singleton; E2 still sees E1 but E1 is already visited.
    assert_eq!(member_ids(&groups), vec![vec![3, 4], vec![1], vec![2]]);
    let numbers: Vec<usize> = groups.iter().map(|g| g.id).collect();
    assert_eq!(numbers, vec![3, 1, 2]);
}

#[tokio::test]
async fn failed_query_for_non_seed_does_not_matter() {
    // E2 is absorbed by E1 and never queried.
    let engine = Engine::new(Arc::new(four_errors().fail_on(2)));
    let recs = records(&[1, 2, 3, 4]);
    let params = Params { threshold: 0.8, min_group_size: 2 };

    let groups = engine
        .cluster(&recs, &params, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(member_ids(&groups), vec![vec![1, 2], vec![3, 4]]);
}

#[tokio::test]
async fn chained_record_starts_its_own_cluster() {
    // A~B and B~C, but A and C are unrelated.
    let engine = Engine::new(Arc::new(ScriptedIndex::with_scores(&[
        (1, 2, 0.9),
        (2, 3, 0.9),
        (1, 3, 0.1),
    ])));
    let recs = records(&[1, 2, 3]);

    let clusters = engine
        .discover(&recs, 0.8, &CancellationToken::new())
        .await
        .unwrap();
    let ids: Vec<Vec<u64>> = clusters.iter().map(|c| c.ids()).collect();
    assert_eq!(ids, vec![vec![1, 2], vec![3]]);
}

#[tokio::test]
async fn timed_out_query_is_fail_open() {
    let engine = Engine::new(Arc::new(four_errors().stall_on(3)))
        .with_query_timeout(Duration::from_millis(30));
    let recs = records(&[1, 2, 3, 4]);
    let params = Params { threshold: 0.8, min_group_size: 1 };

    let groups = engine
        .cluster(&recs, &params, &CancellationToken::new())
        .await
        .unwrap();
    // E3's query timed out, so E4 seeds its own cluster.
    assert_eq!(member_ids(&groups), vec![vec![1, 2], vec![3], vec![4]]);
}

#[tokio::test]
async fn cancellation_during_query_aborts_run() {
    let engine = Engine::new(Arc::new(four_errors().stall_on(3)))
        .with_query_timeout(Duration::from_secs(120));
    let recs = records(&[1, 2, 3, 4]);
    let params = Params { threshold: 0.8, min_group_size: 1 };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = engine.cluster(&recs, &params, &cancel).await.unwrap_err();
    // E1, E2 and the stalled seed E3 were visited.
    assert!(matches!(err, ClusterError::Cancelled { visited: 3, total: 4 }));
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let engine = Engine::new(Arc::new(four_errors()));
    let recs = records(&[1, 2, 3, 4]);
    let params = Params { threshold: 0.4, min_group_size: 1 };
    let cancel = CancellationToken::new();

    let first = engine.cluster(&recs, &params, &cancel).await.unwrap();
    let second = engine.cluster(&recs, &params, &cancel).await.unwrap();
    assert_eq!(first, second);
    // sim(E1,E3)=0.5 now qualifies.
    assert_eq!(member_ids(&first), vec![vec![1, 2, 3], vec![4]]);
}

#[tokio::test]
async fn concurrent_runs_share_one_index() {
    let engine = Arc::new(Engine::new(Arc::new(four_errors())));
    let recs = Arc::new(records(&[1, 2, 3, 4]));

    let mut handles = Vec::new();
    for threshold in [0.4_f32, 0.8, 0.96] {
        let engine = engine.clone();
        let recs = recs.clone();
        handles.push(tokio::spawn(async move {
            let params = Params { threshold, min_group_size: 1 };
            engine
                .cluster(&recs, &params, &CancellationToken::new())
                .await
                .map(|g| g.len())
        }));
    }

    let mut counts = Vec::new();
    for h in handles {
        counts.push(h.await.unwrap().unwrap());
    }
    assert_eq!(counts, vec![2, 2, 4]);
}

// ---------------------------------------------------------------------------
// Properties over generated embeddings
// ---------------------------------------------------------------------------

/// Deterministic pseudo-random unit vector.
fn unit_vec(dim: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    let mut v: Vec<f32> = (0..dim)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) as f32) / (u32::MAX as f32) - 0.25
        })
        .collect();
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    for x in &mut v {
        *x /= norm;
    }
    v
}

async fn generated(n: u64, dim: usize) -> (Arc<MemoryIndex>, Vec<ErrorRecord>) {
    let index = Arc::new(MemoryIndex::new());
    let mut recs = Vec::new();
    for id in 1..=n {
        let emb = unit_vec(dim, id * 7919);
        index.insert(id, &emb).await.unwrap();
        let severity = if id % 3 == 0 { "WARN" } else { "ERROR" };
        recs.push(ErrorRecord::new(id, "Generated", "x", severity, ts()).with_embedding(emb));
    }
    (index, recs)
}

#[tokio::test]
async fn clusters_partition_the_input() {
    let (index, recs) = generated(60, 8).await;
    let engine = Engine::new(index);
    let cancel = CancellationToken::new();

    for threshold in [0.1, 0.5, 0.8, 0.95, 1.0] {
        let clusters = engine.discover(&recs, threshold, &cancel).await.unwrap();
        let mut seen: Vec<u64> = clusters.iter().flat_map(|c| c.ids()).collect();
        assert_eq!(seen.len(), recs.len(), "threshold {threshold}: duplicate or missing");
        seen.sort();
        let expected: Vec<u64> = recs.iter().map(|r| r.id).collect();
        assert_eq!(seen, expected, "threshold {threshold}");
        assert!(clusters.iter().all(|c| !c.is_empty()));
    }
}

#[tokio::test]
async fn raising_threshold_shrinks_first_cluster() {
    let (index, recs) = generated(60, 8).await;
    let engine = Engine::new(index);
    let cancel = CancellationToken::new();

    let thresholds = [0.2, 0.4, 0.6, 0.8, 0.9];
    let mut previous: Option<HashSet<u64>> = None;
    for threshold in thresholds {
        let clusters = engine.discover(&recs, threshold, &cancel).await.unwrap();
        let first: HashSet<u64> = clusters[0].ids().into_iter().collect();
        if let Some(prev) = &previous {
            assert!(first.is_subset(prev), "threshold {threshold} grew the first cluster");
        }
        previous = Some(first);
    }
}

#[tokio::test]
async fn isolated_record_is_a_singleton() {
    let index = Arc::new(MemoryIndex::new());
    let embeddings = [
        vec![1.0, 0.0, 0.0],
        vec![0.98, 0.2, 0.0],
        vec![0.0, 0.0, 1.0],
        vec![0.97, 0.0, 0.24],
    ];
    let mut recs = Vec::new();
    for (i, e) in embeddings.iter().enumerate() {
        let id = i as u64 + 1;
        index.insert(id, e).await.unwrap();
        recs.push(ErrorRecord::new(id, "X", "x", "ERROR", ts()).with_embedding(e.clone()));
    }
    let engine = Engine::new(index);
    let cancel = CancellationToken::new();

    let keep_all = Params { threshold: 0.9, min_group_size: 1 };
    let groups = engine.cluster(&recs, &keep_all, &cancel).await.unwrap();
    assert_eq!(member_ids(&groups), vec![vec![1, 2, 4], vec![3]]);
    assert_eq!(groups[1].avg_similarity, 1.0);

    let pairs_only = Params { threshold: 0.9, min_group_size: 2 };
    let groups = engine.cluster(&recs, &pairs_only, &cancel).await.unwrap();
    assert_eq!(member_ids(&groups), vec![vec![1, 2, 4]]);
}

#[tokio::test]
async fn group_fields_are_consistent() {
    let (index, recs) = generated(40, 4).await;
    let engine = Engine::new(index);
    let params = Params { threshold: 0.6, min_group_size: 1 };

    let groups = engine
        .cluster(&recs, &params, &CancellationToken::new())
        .await
        .unwrap();

    let mut numbers: Vec<usize> = groups.iter().map(|g| g.id).collect();
    numbers.sort();
    assert_eq!(numbers, (1..=groups.len()).collect::<Vec<_>>());

    for pair in groups.windows(2) {
        assert!(pair[0].count >= pair[1].count);
        if pair[0].count == pair[1].count {
            assert!(pair[0].id < pair[1].id, "equal sizes must keep discovery order");
        }
    }
    for g in &groups {
        assert_eq!(g.count, g.members.len());
        assert_eq!(g.representative_type, g.members[0].error_type);
        assert!(g.avg_similarity <= 1.0 + 1e-6);
        assert_eq!(g.name, format!("Generated - {} occurrences", g.count));
    }
}
