//! Command-line interface definitions for the cluster scaling benchmark

use std::path::PathBuf;

use cbscale_common::DurabilityLevel;
use clap::{Args, Parser, Subcommand};

/// Couchbase Cluster Scaling Benchmark
///
/// Sweeps a Couchbase cluster across durability levels, cluster sizes and data
/// set sizes, recording per-operation latencies or YCSB throughput reports.
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Couchbase cluster scaling benchmark",
    long_about = "
Benchmarks a Couchbase cluster while it is grown node by node from a fixed
host inventory.

Commands:
- latency: timed insert, query, search, update and delete operations
- layouts: the same operations while scaling one service tier at a time
- ycsb: YCSB core workloads a-f over the full sweep, or a fixed-topology grid
- plan: print the service layouts a layout sweep would apply
- clear-cluster, flush-bucket, repair-leader: cluster maintenance
- summarize: statistics over a latency output tree

The cluster leader must already be initialized; `couchbase-cli` has to be on
the PATH unless --cli points at it.
"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: BenchCommand,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Host inventory file (JSON)
    ///
    /// `{"hosts": [{"public": ..., "private": ..., "dns": ...}, ...]}`. The
    /// first host is the leader.
    #[arg(long, global = true, default_value = "inventory.json", value_name = "FILE")]
    pub inventory: PathBuf,

    /// Cluster administrator username
    #[arg(long, global = true, env = "CB_USERNAME", default_value = "Administrator")]
    pub username: String,

    /// Cluster administrator password
    #[arg(long, global = true, env = "CB_PASSWORD", default_value = "password")]
    pub password: String,

    /// Path to the couchbase-cli executable
    #[arg(long, global = true, default_value = "couchbase-cli", value_name = "PATH")]
    pub cli: PathBuf,

    /// Seconds a single couchbase-cli call may run before it is killed
    #[arg(long, global = true, default_value_t = 900, value_name = "SECS")]
    pub cli_timeout: u64,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum BenchCommand {
    /// Run the latency sweep
    ///
    /// For every durability level and cluster size, every bucket is prepared,
    /// filled and exercised with each operation kind. The first K latencies of
    /// each kind are appended to the output tree.
    Latency(SweepArgs),

    /// Run the latency sweep once per service layout
    ///
    /// Layouts scale index and query first, then full-text search, one host at
    /// a time, over all followers.
    Layouts(LayoutArgs),

    /// Run YCSB workloads
    Ycsb(YcsbArgs),

    /// Print the planned service layouts for the inventory
    Plan,

    /// Remove every follower from the cluster
    ClearCluster,

    /// Delete every document in a bucket
    FlushBucket {
        /// Bucket name
        name: String,
    },

    /// Re-bind the leader by its DNS name
    ///
    /// Removes the leader, re-adds a follower by DNS as interim leader, then
    /// re-adds the original leader by DNS.
    RepairLeader,

    /// Summarize a latency output tree
    Summarize(SummarizeArgs),
}

/// Settings shared by the sweeping commands
///
/// Flags override values from `--config`.
#[derive(Args, Debug, Clone, Default)]
pub struct SweepArgs {
    /// Sweep settings file (JSON); every field is optional
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Documents in the small bucket; medium and large hold 3x and 5x
    #[arg(long, value_name = "COUNT")]
    pub data_sample_size: Option<usize>,

    /// Operations per kind whose latency is recorded
    #[arg(long, value_name = "COUNT")]
    pub operation_sample_size: Option<usize>,

    /// Durability levels to sweep (repeatable)
    #[arg(long, value_name = "LEVEL")]
    pub durability: Vec<DurabilityLevel>,

    /// Root of the output tree
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Seed for document generation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Rebind the leader by DNS before sweeping
    ///
    /// Runs the leader repair sequence once; every later call then targets
    /// the leader's DNS name.
    #[arg(long)]
    pub repair_leader: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LayoutArgs {
    #[command(flatten)]
    pub sweep: SweepArgs,

    /// Durability level used for every layout
    #[arg(long = "layout-durability", default_value = "low", value_name = "LEVEL")]
    pub layout_durability: DurabilityLevel,
}

#[derive(Args, Debug, Clone)]
pub struct YcsbArgs {
    #[command(flatten)]
    pub sweep: SweepArgs,

    /// YCSB installation directory
    #[arg(long, default_value = "ycsb", value_name = "DIR")]
    pub ycsb_home: PathBuf,

    /// Run the fixed-topology parameter grid instead of the full sweep
    ///
    /// The grid is read from this JSON file; missing dimensions use defaults.
    #[arg(long, value_name = "FILE")]
    pub grid: Option<PathBuf>,

    /// Bucket the grid runs against
    #[arg(long, default_value = "small-bucket")]
    pub bucket: String,

    /// Base core workload for grid points
    #[arg(long, default_value = "a")]
    pub workload: String,

    /// Seconds a single `ycsb load` or `ycsb run` may take before it is killed
    #[arg(long, default_value_t = 3600, value_name = "SECS")]
    pub ycsb_timeout: u64,
}

#[derive(Args, Debug, Clone)]
pub struct SummarizeArgs {
    /// Root of a latency output tree
    pub dir: PathBuf,

    /// Also save the summary as JSON
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}
