//! Type definitions and data structures for cluster benchmarking
//!
//! This module contains the core data structures used throughout the benchmark
//! driver: sweep configuration, per-combination parameters, run reports and
//! the error type.

use std::{fs, path::Path, path::PathBuf};

use anyhow::Context;
use cbscale_common::{constants::BUCKET_RAM_QUOTA_MB, DurabilityLevel};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for benchmark operations
pub type BenchmarkResult<T> = Result<T, BenchmarkError>;

/// Error types for benchmark operations
#[derive(Error, Debug)]
pub enum BenchmarkError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cluster error: {0}")]
    Cluster(#[from] cbscale::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(#[from] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A dataset size the sweep runs against; the label doubles as bucket name
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BucketSize {
    pub label: String,
    /// Number of documents inserted in this bucket per round
    pub docs: usize,
}

impl BucketSize {
    #[must_use]
    pub fn new(label: impl Into<String>, docs: usize) -> Self {
        Self {
            label: label.into(),
            docs,
        }
    }

    /// Small, medium and large buckets holding 1x, 3x and 5x `base` documents
    #[must_use]
    pub fn standard(base: usize) -> Vec<Self> {
        vec![
            Self::new("small-bucket", base),
            Self::new("medium-bucket", base * 3),
            Self::new("large-bucket", base * 5),
        ]
    }
}

/// One point of the sweep's cross product
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkParameters {
    pub durability: DurabilityLevel,
    /// Followers added beyond the leader; 0 means a leader-only cluster
    pub cluster_size: usize,
    pub bucket_label: String,
    pub workload_id: String,
}

impl BenchmarkParameters {
    /// Replicas are only configured once there is a node to hold them
    #[must_use]
    pub const fn replicas(&self) -> u32 {
        replicas_for(self.cluster_size)
    }

    /// Cluster size counting the leader, as used in output paths
    #[must_use]
    pub const fn total_nodes(&self) -> usize {
        self.cluster_size + 1
    }
}

#[must_use]
pub const fn replicas_for(cluster_size: usize) -> u32 {
    if cluster_size == 0 {
        0
    } else {
        1
    }
}

fn default_durabilities() -> Vec<DurabilityLevel> {
    DurabilityLevel::ALL.to_vec()
}

fn default_buckets() -> Vec<BucketSize> {
    BucketSize::standard(1000)
}

fn default_operations_to_record() -> usize {
    100
}

fn default_scope() -> String {
    cbscale_common::constants::DEFAULT_SCOPE.to_string()
}

fn default_collection() -> String {
    cbscale_common::constants::DEFAULT_COLLECTION.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_bucket_ram_mb() -> u32 {
    BUCKET_RAM_QUOTA_MB
}

/// Settings for a benchmark sweep
///
/// Every field has a default, so a sweep file only needs to list what it
/// changes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SweepConfig {
    /// Durability levels, outermost loop
    #[serde(default = "default_durabilities")]
    pub durabilities: Vec<DurabilityLevel>,
    /// Dataset sizes, third loop
    #[serde(default = "default_buckets")]
    pub buckets: Vec<BucketSize>,
    /// Sample budget: operations per kind whose latency is persisted
    #[serde(default = "default_operations_to_record")]
    pub operations_to_record: usize,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Root of the latency output tree
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_bucket_ram_mb")]
    pub bucket_ram_mb: u32,
    /// Seed for document generation; random when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            durabilities: default_durabilities(),
            buckets: default_buckets(),
            operations_to_record: default_operations_to_record(),
            scope: default_scope(),
            collection: default_collection(),
            output_dir: default_output_dir(),
            bucket_ram_mb: default_bucket_ram_mb(),
            seed: None,
        }
    }
}

impl SweepConfig {
    /// Load sweep settings from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> BenchmarkResult<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read sweep config: {}", path.as_ref().display())
        })?;
        let config: Self = serde_json::from_str(&content).with_context(|| {
            format!("Failed to parse sweep config: {}", path.as_ref().display())
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BenchmarkResult<()> {
        if self.durabilities.is_empty() {
            return Err(BenchmarkError::Configuration(
                "at least one durability level is required".to_string(),
            ));
        }
        if self.buckets.is_empty() {
            return Err(BenchmarkError::Configuration(
                "at least one bucket size is required".to_string(),
            ));
        }
        if let Some(bucket) = self.buckets.iter().find(|b| b.label.is_empty()) {
            return Err(BenchmarkError::Configuration(format!(
                "bucket with {} docs has an empty label",
                bucket.docs
            )));
        }
        Ok(())
    }
}

/// Outcome counts of one sweep
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Workload executions started, one per parameter combination
    pub combinations: usize,
    /// Topology, bucket or workload calls that failed and were skipped
    pub failed_calls: usize,
    /// Whether the sweep stopped early on request
    pub interrupted: bool,
}

/// Outcome counts of one operation batch
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub executed: usize,
    pub recorded: usize,
    pub conflicts: usize,
    pub timeouts: usize,
    pub failed: usize,
}

/// Statistical summary of one latency file
///
/// All values are in seconds
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct LatencySummary {
    /// Latency file this summary was computed from
    pub path: PathBuf,
    pub samples: usize,
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

/// Complete results of summarizing a latency output tree
#[derive(Serialize, Deserialize, Debug)]
pub struct LatencyResults {
    /// ISO 8601 timestamp of when the summary was produced
    pub timestamp: String,
    pub root: PathBuf,
    pub files: Vec<LatencySummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replica_policy() {
        assert_eq!(replicas_for(0), 0);
        assert_eq!(replicas_for(1), 1);
        assert_eq!(replicas_for(4), 1);
    }

    #[test]
    fn test_standard_buckets() {
        let buckets = BucketSize::standard(1000);
        assert_eq!(
            buckets,
            vec![
                BucketSize::new("small-bucket", 1000),
                BucketSize::new("medium-bucket", 3000),
                BucketSize::new("large-bucket", 5000),
            ]
        );
    }

    #[test]
    fn test_sweep_config_defaults_fill_missing_fields() {
        let config: SweepConfig =
            serde_json::from_str(r#"{"durabilities": ["high"], "operations_to_record": 5}"#)
                .unwrap();
        assert_eq!(config.durabilities, vec![DurabilityLevel::High]);
        assert_eq!(config.operations_to_record, 5);
        assert_eq!(config.buckets.len(), 3);
        assert_eq!(config.scope, "default_scope");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sweep_config_validation() {
        let config = SweepConfig {
            buckets: Vec::new(),
            ..SweepConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BenchmarkError::Configuration(_))
        ));
    }

    #[test]
    fn test_sweep_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        std::fs::write(&path, r#"{"buckets": [{"label": "tiny", "docs": 10}]}"#).unwrap();
        let config = SweepConfig::load_from_file(&path).unwrap();
        assert_eq!(config.buckets, vec![BucketSize::new("tiny", 10)]);

        std::fs::write(&path, r#"{"durabilities": []}"#).unwrap();
        assert!(SweepConfig::load_from_file(&path).is_err());
    }
}
