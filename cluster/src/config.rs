use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ClusterError;
use crate::types::Params;

/// Grouping defaults, loadable from YAML.
///
/// ```yaml
/// threshold: 0.8
/// min_group_size: 3
/// window_hours: 48
/// query_timeout_ms: 2000
/// ```
///
/// Zero (or missing) fields take their defaults via [`Config::with_defaults`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum cosine similarity for two errors to be grouped.
    /// Default: 0.75.
    pub threshold: f32,

    /// Smallest group reported.
    /// Default: 2.
    pub min_group_size: usize,

    /// How far back `group_recent` looks, in hours.
    /// Default: 24.
    pub window_hours: u32,

    /// Time budget of one neighbor query, in milliseconds.
    /// Default: 5000.
    pub query_timeout_ms: u64,
}

impl Config {
    pub fn with_defaults(mut self) -> Self {
        if self.threshold == 0.0 {
            self.threshold = 0.75;
        }
        if self.min_group_size == 0 {
            self.min_group_size = 2;
        }
        if self.window_hours == 0 {
            self.window_hours = 24;
        }
        if self.query_timeout_ms == 0 {
            self.query_timeout_ms = 5000;
        }
        self
    }

    /// Reads a YAML config file and fills in defaults.
    pub fn load(path: &Path) -> Result<Self, ClusterError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ClusterError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self, ClusterError> {
        let cfg: Config =
            serde_yaml::from_str(data).map_err(|e| ClusterError::Config(e.to_string()))?;
        Ok(cfg.with_defaults())
    }

    pub fn params(&self) -> Params {
        Params {
            threshold: self.threshold,
            min_group_size: self.min_group_size,
        }
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.window_hours as i64)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}
