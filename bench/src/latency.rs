//! Latency output tree
//!
//! Samples land in one file per (durability, cluster size, bucket, operation
//! kind) combination:
//!
//! ```text
//! {root}/[layout-{name}/]durability-{level}/cluster-size-{nodes}/{bucket}/{kind}/latencies.txt
//! ```
//!
//! `nodes` counts the leader. The same tree is read back by `summarize`.

use std::path::{Path, PathBuf};

use cbscale_common::{DurabilityLevel, OperationKind};
use chrono::Utc;
use log::info;
use walkdir::WalkDir;

use crate::{
    types::{BenchmarkResult, LatencyResults, LatencySummary},
    utils::{build_latency_summary, format_seconds, read_latency_file},
};

pub const LATENCY_FILE_NAME: &str = "latencies.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyLayout {
    root: PathBuf,
    layout: Option<String>,
}

impl LatencyLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            layout: None,
        }
    }

    /// Same tree nested under a `layout-{name}` directory
    #[must_use]
    pub fn for_layout(&self, name: impl Into<String>) -> Self {
        Self {
            root: self.root.clone(),
            layout: Some(name.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Latency file for one combination; `cluster_size` excludes the leader
    pub fn file(
        &self,
        durability: DurabilityLevel,
        cluster_size: usize,
        bucket: &str,
        kind: OperationKind,
    ) -> PathBuf {
        let mut path = self.root.clone();
        if let Some(layout) = &self.layout {
            path.push(format!("layout-{layout}"));
        }
        path.push(format!("durability-{durability}"));
        path.push(format!("cluster-size-{}", cluster_size + 1));
        path.push(bucket);
        path.push(kind.token());
        path.push(LATENCY_FILE_NAME);
        path
    }
}

/// Every latency file under `root`, sorted by path
pub fn find_latency_files(root: &Path) -> BenchmarkResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && entry.file_name() == LATENCY_FILE_NAME {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

/// Summarize every latency file of the tree under `root`
pub fn summarize_tree(root: &Path) -> BenchmarkResult<LatencyResults> {
    let files = find_latency_files(root)?;
    info!("Summarizing {} latency files under {}", files.len(), root.display());

    let mut summaries = Vec::with_capacity(files.len());
    for path in files {
        let samples = read_latency_file(&path)?;
        let relative = path.strip_prefix(root).unwrap_or(&path);
        summaries.push(build_latency_summary(relative, &samples));
    }

    Ok(LatencyResults {
        timestamp: Utc::now().to_rfc3339(),
        root: root.to_path_buf(),
        files: summaries,
    })
}

pub fn print_summary(results: &LatencyResults) {
    info!("=== Latency Results ({}) ===", results.root.display());
    for summary in &results.files {
        print_file_summary(summary);
    }
}

fn print_file_summary(summary: &LatencySummary) {
    info!("{} ({} samples)", summary.path.display(), summary.samples);
    info!(
        "  avg {}  p50 {}  p95 {}  p99 {}  max {}",
        format_seconds(summary.avg),
        format_seconds(summary.p50),
        format_seconds(summary.p95),
        format_seconds(summary.p99),
        format_seconds(summary.max)
    );
}
