//! Couchbase cluster scaling benchmark
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin bench -- --inventory inventory.json latency --data-sample-size 1000
//! cargo run --bin bench -- --inventory inventory.json layouts --layout-durability high
//! cargo run --bin bench -- --inventory inventory.json ycsb --ycsb-home ycsb
//! cargo run --bin bench -- summarize data --output summary.json
//! ```

use bench::{
    cli::{BenchCommand, Cli},
    commands, init_logging, install_stop_flag,
    types::BenchmarkResult,
    BenchmarkError,
};
use clap::Parser;
use log::{error, info};

fn main() -> BenchmarkResult<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose)?;

    info!("Starting cluster scaling benchmark");

    let global = &cli.global;
    let result = match &cli.command {
        BenchCommand::Latency(args) => {
            let stop = install_stop_flag()?;
            commands::run_latency(global, args, stop).map(|_| ())
        }
        BenchCommand::Layouts(args) => {
            let stop = install_stop_flag()?;
            commands::run_layouts(global, args, stop).map(|_| ())
        }
        BenchCommand::Ycsb(args) => {
            let stop = install_stop_flag()?;
            commands::run_ycsb(global, args, stop)
        }
        BenchCommand::Plan => commands::run_plan(global),
        BenchCommand::ClearCluster => commands::run_clear_cluster(global),
        BenchCommand::FlushBucket { name } => commands::run_flush_bucket(global, name),
        BenchCommand::RepairLeader => commands::run_repair_leader(global),
        BenchCommand::Summarize(args) => commands::run_summarize(args),
    };

    if let Err(ref e) = result {
        error!("Benchmark failed: {e}");

        match e {
            BenchmarkError::Configuration(_) | BenchmarkError::General(_) => {
                error!("Please check the inventory and sweep configuration files");
            }
            BenchmarkError::Cluster(cbscale::Error::ExternalCall { .. }) => {
                error!("Please ensure couchbase-cli is installed and the leader is reachable");
            }
            _ => {}
        }

        std::process::exit(1);
    }

    info!("Benchmark completed successfully");
    Ok(())
}
