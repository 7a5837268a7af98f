//! YCSB workloads
//!
//! Two ways of driving the YCSB `couchbase2` binding:
//!
//! - [`YcsbWorkloadExecutor`] plugs the standard workloads `a`..`f` into the
//!   benchmark sweep, one output file per sweep combination.
//! - [`run_grid_sweep`] keeps the topology fixed and walks a grid of record
//!   counts, field shapes, request distributions and operation mixes.
//!
//! Every run loads the data set first and then runs the workload; the output
//! of the run phase is saved verbatim.

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use cbscale::process::run_with_timeout;
use cbscale_common::DurabilityLevel;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::{
    sweep::{StepContext, WorkloadExecutor},
    types::{BenchmarkError, BenchmarkParameters, BenchmarkResult},
};

/// Default bound on one `ycsb load` or `ycsb run` invocation
pub const YCSB_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Standard YCSB core workloads
pub const YCSB_WORKLOADS: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

/// One invocation of the YCSB client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YcsbRun {
    /// Core workload letter whose property file is the base configuration
    pub workload: String,
    /// `-p key=value` overrides, in order
    pub properties: Vec<(String, String)>,
}

pub trait YcsbRunner {
    /// Load the data set
    fn load(&mut self, run: &YcsbRun) -> BenchmarkResult<String>;

    /// Run the workload, returning the client's report
    fn run(&mut self, run: &YcsbRun) -> BenchmarkResult<String>;
}

/// Runs `bin/ycsb` from a YCSB installation directory
#[derive(Debug, Clone)]
pub struct ProcessYcsbRunner {
    home: PathBuf,
    timeout: Duration,
}

impl ProcessYcsbRunner {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            timeout: YCSB_TIMEOUT,
        }
    }

    /// Kill a phase that runs longer than `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> PathBuf {
        self.home.join("bin").join("ycsb")
    }

    fn command_args(&self, phase: &str, run: &YcsbRun) -> Vec<String> {
        let workload_file = self
            .home
            .join("workloads")
            .join(format!("workload{}", run.workload));
        let mut argv = vec![
            phase.to_string(),
            "couchbase2".to_string(),
            "-s".to_string(),
            "-P".to_string(),
            workload_file.display().to_string(),
        ];
        for (key, value) in &run.properties {
            argv.push("-p".to_string());
            argv.push(format!("{key}={value}"));
        }
        argv
    }

    fn invoke(&self, phase: &str, run: &YcsbRun) -> BenchmarkResult<String> {
        let argv = self.command_args(phase, run);
        debug!("{} {}", self.program().display(), argv.join(" "));

        let label = format!("ycsb {phase} workload{}", run.workload);
        let output = run_with_timeout(
            Command::new(self.program()).args(&argv),
            &label,
            self.timeout,
        )?;
        if !output.status.success() {
            return Err(cbscale::Error::external(
                label,
                format!("exited with {}: {}", output.status, output.stderr.trim()),
            )
            .into());
        }
        Ok(output.stdout)
    }
}

impl YcsbRunner for ProcessYcsbRunner {
    fn load(&mut self, run: &YcsbRun) -> BenchmarkResult<String> {
        self.invoke("load", run)
    }

    fn run(&mut self, run: &YcsbRun) -> BenchmarkResult<String> {
        self.invoke("run", run)
    }
}

/// Observe constraints (persistTo, replicateTo) matching a durability level
#[must_use]
pub const fn observe_constraints(durability: DurabilityLevel, replicas: u32) -> (u32, u32) {
    match durability {
        DurabilityLevel::Low => (0, replicas),
        DurabilityLevel::Medium => (1, replicas),
        DurabilityLevel::High => (replicas + 1, replicas),
    }
}

/// Connection properties for the `couchbase2` binding
pub fn connection_properties(
    host: &str,
    bucket: &str,
    password: &str,
    durability: DurabilityLevel,
    replicas: u32,
) -> Vec<(String, String)> {
    let (persist_to, replicate_to) = observe_constraints(durability, replicas);
    vec![
        ("couchbase.host".to_string(), host.to_string()),
        ("couchbase.bucket".to_string(), bucket.to_string()),
        ("couchbase.password".to_string(), password.to_string()),
        ("couchbase.persistTo".to_string(), persist_to.to_string()),
        ("couchbase.replicateTo".to_string(), replicate_to.to_string()),
    ]
}

fn load_and_run<R>(runner: &mut R, run: &YcsbRun) -> BenchmarkResult<String>
where
    R: YcsbRunner + ?Sized,
{
    let loaded = runner.load(run)?;
    debug!("{loaded}");
    runner.run(run)
}

fn save_output(dir: &Path, name: &str, output: &str) -> BenchmarkResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(name);
    fs::write(&path, output)?;
    info!("YCSB output saved to {}", path.display());
    Ok(path)
}

/// Runs workloads `a`..`f` for every sweep combination
///
/// Buckets are accessed with the per-bucket user the sweep creates, whose
/// password is the bucket label.
pub struct YcsbWorkloadExecutor<R> {
    runner: R,
    host: String,
    output_dir: PathBuf,
}

impl<R: YcsbRunner> YcsbWorkloadExecutor<R> {
    pub fn new(runner: R, host: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            host: host.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }
}

/// Output file name of one sweep combination
#[must_use]
pub fn workload_file_name(params: &BenchmarkParameters) -> String {
    format!(
        "durability{}-clustersize{}-bucketsize{}-workload{}.txt",
        params.durability,
        params.total_nodes(),
        params.bucket_label,
        params.workload_id
    )
}

impl<R: YcsbRunner> WorkloadExecutor for YcsbWorkloadExecutor<R> {
    fn workloads(&self) -> Vec<String> {
        YCSB_WORKLOADS.iter().map(|w| (*w).to_string()).collect()
    }

    fn execute(&mut self, params: &BenchmarkParameters, step: &StepContext) -> BenchmarkResult<()> {
        let bucket = step.keyspace.bucket.as_str();
        let run = YcsbRun {
            workload: params.workload_id.clone(),
            properties: connection_properties(
                &self.host,
                bucket,
                bucket,
                params.durability,
                params.replicas(),
            ),
        };
        let output = load_and_run(&mut self.runner, &run)?;
        save_output(&self.output_dir, &workload_file_name(params), &output)?;
        Ok(())
    }
}

/// Share of each operation type in a workload; the four should sum to 1
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct OperationMix {
    pub read: f64,
    pub update: f64,
    pub scan: f64,
    pub insert: f64,
}

impl OperationMix {
    #[must_use]
    pub const fn new(read: f64, update: f64, scan: f64, insert: f64) -> Self {
        Self {
            read,
            update,
            scan,
            insert,
        }
    }

    pub fn validate(&self) -> BenchmarkResult<()> {
        let parts = [self.read, self.update, self.scan, self.insert];
        if parts.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(BenchmarkError::Configuration(format!(
                "operation proportions must lie in [0, 1]: {self:?}"
            )));
        }
        let total: f64 = parts.iter().sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(BenchmarkError::Configuration(format!(
                "operation proportions sum to {total}, expected 1"
            )));
        }
        Ok(())
    }
}

/// One point of the grid sweep
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct YcsbParameters {
    pub record_count: u64,
    pub field_count: u32,
    pub field_length: u32,
    pub distribution: String,
    pub mix: OperationMix,
}

impl YcsbParameters {
    /// Workload property overrides for this point
    pub fn properties(&self) -> Vec<(String, String)> {
        vec![
            ("recordcount".to_string(), self.record_count.to_string()),
            ("operationcount".to_string(), self.record_count.to_string()),
            ("fieldcount".to_string(), self.field_count.to_string()),
            ("fieldlength".to_string(), self.field_length.to_string()),
            ("requestdistribution".to_string(), self.distribution.clone()),
            ("readproportion".to_string(), self.mix.read.to_string()),
            ("updateproportion".to_string(), self.mix.update.to_string()),
            ("scanproportion".to_string(), self.mix.scan.to_string()),
            ("insertproportion".to_string(), self.mix.insert.to_string()),
        ]
    }

    /// Output file name; `cluster_size` counts the leader
    #[must_use]
    pub fn output_file_name(&self, cluster_size: usize) -> String {
        format!(
            "clustersize{cluster_size}-recordcount{}-fieldcount{}-fieldlength{}-distribution{}-read{}-update{}-scan{}-insert{}.txt",
            self.record_count,
            self.field_count,
            self.field_length,
            self.distribution,
            self.mix.read,
            self.mix.update,
            self.mix.scan,
            self.mix.insert
        )
    }
}

fn default_record_counts() -> Vec<u64> {
    vec![1000, 10_000]
}

fn default_field_counts() -> Vec<u32> {
    vec![10]
}

fn default_field_lengths() -> Vec<u32> {
    vec![100]
}

fn default_distributions() -> Vec<String> {
    vec!["zipfian".to_string(), "uniform".to_string()]
}

fn default_mixes() -> Vec<OperationMix> {
    vec![
        OperationMix::new(0.5, 0.5, 0.0, 0.0),
        OperationMix::new(0.95, 0.05, 0.0, 0.0),
        OperationMix::new(1.0, 0.0, 0.0, 0.0),
    ]
}

/// Parameter grid of the fixed-topology sweep
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct YcsbGrid {
    #[serde(default = "default_record_counts")]
    pub record_counts: Vec<u64>,
    #[serde(default = "default_field_counts")]
    pub field_counts: Vec<u32>,
    #[serde(default = "default_field_lengths")]
    pub field_lengths: Vec<u32>,
    #[serde(default = "default_distributions")]
    pub distributions: Vec<String>,
    #[serde(default = "default_mixes")]
    pub mixes: Vec<OperationMix>,
}

impl Default for YcsbGrid {
    fn default() -> Self {
        Self {
            record_counts: default_record_counts(),
            field_counts: default_field_counts(),
            field_lengths: default_field_lengths(),
            distributions: default_distributions(),
            mixes: default_mixes(),
        }
    }
}

impl YcsbGrid {
    pub fn validate(&self) -> BenchmarkResult<()> {
        if self.record_counts.is_empty()
            || self.field_counts.is_empty()
            || self.field_lengths.is_empty()
            || self.distributions.is_empty()
            || self.mixes.is_empty()
        {
            return Err(BenchmarkError::Configuration(
                "every YCSB grid dimension needs at least one value".to_string(),
            ));
        }
        self.mixes.iter().try_for_each(OperationMix::validate)
    }

    /// Every grid point, record count outermost and mix innermost
    pub fn combinations(&self) -> Vec<YcsbParameters> {
        let mut points = Vec::new();
        for &record_count in &self.record_counts {
            for &field_count in &self.field_counts {
                for &field_length in &self.field_lengths {
                    for distribution in &self.distributions {
                        for &mix in &self.mixes {
                            points.push(YcsbParameters {
                                record_count,
                                field_count,
                                field_length,
                                distribution: distribution.clone(),
                                mix,
                            });
                        }
                    }
                }
            }
        }
        points
    }
}

/// Fixed cluster the grid sweep runs against
#[derive(Debug, Clone)]
pub struct GridTarget {
    pub host: String,
    pub bucket: String,
    pub password: String,
    pub durability: DurabilityLevel,
    pub replicas: u32,
    /// Nodes in the cluster, leader included
    pub cluster_size: usize,
    /// Base core workload for every point
    pub workload: String,
}

/// Outcome counts of a grid sweep
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct GridReport {
    pub completed: usize,
    pub failed: usize,
    pub interrupted: bool,
}

/// Load and run every grid point, saving each run's output under `output_dir`
///
/// A failing point is logged and skipped.
pub fn run_grid_sweep<R>(
    runner: &mut R,
    grid: &YcsbGrid,
    target: &GridTarget,
    output_dir: &Path,
    stop: &AtomicBool,
) -> BenchmarkResult<GridReport>
where
    R: YcsbRunner + ?Sized,
{
    grid.validate()?;
    let connection = connection_properties(
        &target.host,
        &target.bucket,
        &target.password,
        target.durability,
        target.replicas,
    );

    let points = grid.combinations();
    info!("Running {} YCSB grid points", points.len());

    let mut report = GridReport::default();
    for params in points {
        if stop.load(Ordering::SeqCst) {
            report.interrupted = true;
            break;
        }
        let name = params.output_file_name(target.cluster_size);
        info!("=== {name} ===");

        let mut properties = connection.clone();
        properties.extend(params.properties());
        let run = YcsbRun {
            workload: target.workload.clone(),
            properties,
        };

        match load_and_run(runner, &run)
            .and_then(|output| save_output(output_dir, &name, &output))
        {
            Ok(_) => report.completed += 1,
            Err(e) => {
                error!("YCSB run {name} failed: {e}");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}
