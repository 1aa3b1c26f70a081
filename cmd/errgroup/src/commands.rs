use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use errgroup_cluster::{
    Config, ErrorGroup, ErrorRecord, GroupingService, MemorySource, Params, Resolution, prepare,
};
use errgroup_vecstore::{MemoryIndex, SimilarityIndex};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Cli;

#[derive(Args)]
pub struct GroupsCommand {
    /// Similarity threshold in (0, 1] (default: config, then 0.75)
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Smallest group to report (default: config, then 2)
    #[arg(short, long)]
    min_group_size: Option<usize>,

    /// Only group errors from the last N hours (default: config, then 24)
    #[arg(long)]
    hours: Option<u32>,

    /// Group every record regardless of age
    #[arg(long, conflicts_with = "hours")]
    all: bool,
}

impl GroupsCommand {
    pub async fn run(&self, cli: &Cli, cancel: &CancellationToken) -> Result<()> {
        let config = load_config(cli)?;
        let params = Params {
            threshold: self.threshold.unwrap_or(config.threshold),
            min_group_size: self.min_group_size.unwrap_or(config.min_group_size),
        };
        let hours = self.hours.unwrap_or(config.window_hours);
        let service = build_service(load_records(cli)?, config).await?;

        let groups = if self.all {
            service.group_all(&params, cancel).await?
        } else {
            let window = chrono::Duration::hours(hours as i64);
            service.group_recent(&params, window, cancel).await?
        };

        info!(groups = groups.len(), "writing groups");
        let views: Vec<GroupView<'_>> = groups.iter().map(GroupView::from).collect();
        write_output(cli, &views)
    }
}

#[derive(Args)]
pub struct StatsCommand {
    /// Similarity threshold in (0, 1] (default: config, then 0.75)
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Look back N hours (default: config, then 24)
    #[arg(long)]
    hours: Option<u32>,
}

impl StatsCommand {
    pub async fn run(&self, cli: &Cli, cancel: &CancellationToken) -> Result<()> {
        let config = load_config(cli)?;
        let threshold = self.threshold.unwrap_or(config.threshold);
        let hours = self.hours.unwrap_or(config.window_hours);
        let service = build_service(load_records(cli)?, config).await?;

        let stats = service
            .statistics(threshold, chrono::Duration::hours(hours as i64), cancel)
            .await?;
        write_output(cli, &stats)
    }
}

#[derive(Args)]
pub struct SimilarCommand {
    /// Record to compare against
    #[arg(long)]
    id: u64,

    /// Maximum number of results
    #[arg(short = 'k', long, default_value_t = 5)]
    top_k: usize,

    /// Similarity threshold in (0, 1] (default: config, then 0.75)
    #[arg(short, long)]
    threshold: Option<f32>,
}

impl SimilarCommand {
    pub async fn run(&self, cli: &Cli, cancel: &CancellationToken) -> Result<()> {
        let config = load_config(cli)?;
        let threshold = self.threshold.unwrap_or(config.threshold);
        let records = load_records(cli)?;
        let service = build_service(records.clone(), config).await?;
        let records = prepare(records)?;

        let Some(source) = records.iter().find(|r| r.id == self.id) else {
            bail!("record {} not found or has no embedding", self.id);
        };

        let resolution = tokio::select! {
            _ = cancel.cancelled() => bail!("cancelled"),
            r = service.engine().similar_to(source, &records, self.top_k, threshold) => r?,
        };
        let neighbors = match resolution {
            Resolution::Found(neighbors) => neighbors,
            Resolution::Failed(e) => bail!("similarity query failed: {e}"),
        };

        let views: Vec<SimilarView<'_>> = neighbors
            .iter()
            .map(|n| SimilarView {
                id: n.record.id,
                error_type: &n.record.error_type,
                message: &n.record.message,
                similarity: n.similarity,
            })
            .collect();
        write_output(cli, &views)
    }
}

/// Group as written to the output, without member embeddings.
#[derive(Debug, Serialize)]
struct GroupView<'a> {
    group_id: String,
    name: &'a str,
    representative_type: &'a str,
    representative_message: &'a str,
    severity: &'a str,
    count: usize,
    avg_similarity: f32,
    member_ids: Vec<u64>,
}

impl<'a> From<&'a ErrorGroup> for GroupView<'a> {
    fn from(g: &'a ErrorGroup) -> Self {
        Self {
            group_id: g.group_id(),
            name: &g.name,
            representative_type: &g.representative_type,
            representative_message: &g.representative_message,
            severity: &g.severity,
            count: g.count,
            avg_similarity: g.avg_similarity,
            member_ids: g.member_ids(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SimilarView<'a> {
    id: u64,
    error_type: &'a str,
    message: &'a str,
    similarity: f32,
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Ok(Config::load(path)?),
        None => Ok(Config::default().with_defaults()),
    }
}

fn load_records(cli: &Cli) -> Result<Vec<ErrorRecord>> {
    let path = cli
        .input
        .as_deref()
        .context("no records file given (use -f)")?;
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_records(path, &data)
}

fn parse_records(path: &Path, data: &str) -> Result<Vec<ErrorRecord>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(data)
            .with_context(|| format!("invalid YAML records in {}", path.display())),
        _ => serde_json::from_str(data)
            .with_context(|| format!("invalid JSON records in {}", path.display())),
    }
}

/// Indexes every embedded record in memory and wraps both in a service.
async fn build_service(records: Vec<ErrorRecord>, config: Config) -> Result<GroupingService> {
    let index = Arc::new(MemoryIndex::new());
    let embedded: Vec<(u64, &[f32])> = records
        .iter()
        .filter_map(|r| r.embedding.as_deref().map(|e| (r.id, e)))
        .collect();
    let ids: Vec<u64> = embedded.iter().map(|(id, _)| *id).collect();
    let vectors: Vec<&[f32]> = embedded.iter().map(|(_, e)| *e).collect();
    index
        .batch_insert(&ids, &vectors)
        .await
        .context("failed to index embeddings")?;
    info!(records = records.len(), indexed = ids.len(), "records loaded");

    let source = Arc::new(MemorySource::new());
    source.extend(records);
    Ok(GroupingService::new(source, index, config))
}

fn write_output<T: Serialize + ?Sized>(cli: &Cli, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match &cli.output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}
