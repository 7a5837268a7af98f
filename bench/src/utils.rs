//! Utility Functions Module
//!
//! Statistics over latency samples, latency file I/O and JSON result output
//! shared by the sweep drivers and the `summarize` command.

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::Path,
    time::Duration,
};

use serde::Serialize;

use crate::types::{BenchmarkError, BenchmarkResult, LatencySummary};

/// Arithmetic mean of `values`, or 0.0 when empty
pub fn calculate_average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Percentile of `values` (0.0 to 100.0) by rounding to the nearest rank
///
/// Returns 0.0 for an empty slice.
pub fn calculate_percentile(values: &[f64], percentile: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let last = sorted.len() - 1;
    let rank = (percentile / 100.0 * last as f64).round() as usize;
    sorted[rank.min(last)]
}

/// Serializes `data` as pretty JSON into `path`
pub fn save_json_results<T: Serialize>(data: &T, path: &Path) -> BenchmarkResult<()> {
    let json = serde_json::to_string_pretty(data)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;

    log::info!("Results saved to {}", path.display());
    Ok(())
}

/// Formats a duration given in seconds with a readable unit
pub fn format_seconds(seconds: f64) -> String {
    if seconds < 0.001 {
        format!("{:.2}μs", seconds * 1_000_000.0)
    } else if seconds < 1.0 {
        format!("{:.2}ms", seconds * 1000.0)
    } else {
        format!("{seconds:.2}s")
    }
}

/// Appends one latency sample, in seconds, as its own line
///
/// The parent directory is created when missing.
pub fn append_latency(path: &Path, elapsed: Duration) -> BenchmarkResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", elapsed.as_secs_f64())?;
    Ok(())
}

/// Reads every sample of a latency file
///
/// Blank lines are skipped; anything else that is not a number is an error.
pub fn read_latency_file(path: &Path) -> BenchmarkResult<Vec<f64>> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<f64>().map_err(|e| {
                BenchmarkError::Configuration(format!(
                    "bad latency sample {line:?} in {}: {e}",
                    path.display()
                ))
            })
        })
        .collect()
}

/// Builds the summary of one latency file's samples
pub fn build_latency_summary(path: &Path, samples: &[f64]) -> LatencySummary {
    if samples.is_empty() {
        return LatencySummary {
            path: path.to_path_buf(),
            ..LatencySummary::default()
        };
    }

    LatencySummary {
        path: path.to_path_buf(),
        samples: samples.len(),
        avg: calculate_average(samples),
        p50: calculate_percentile(samples, 50.0),
        p95: calculate_percentile(samples, 95.0),
        p99: calculate_percentile(samples, 99.0),
        max: samples.iter().fold(0.0f64, |a, &b| a.max(b)),
    }
}
