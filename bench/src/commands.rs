//! Command implementations behind the `bench` binary
//!
//! Each function wires the real collaborators (`couchbase-cli`, the query and
//! search REST services, the YCSB client) to the library pieces and logs a
//! summary when done.

use std::{
    fs,
    path::Path,
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};

use anyhow::Context;
use cbscale::{
    plan_scaling_layouts, BucketController, CouchbaseCli, HostRegistry, InventoryConfig,
    LeaderRepair, QueryServiceClient, TopologyController,
};
use cbscale_common::{AddressKind, ServiceSet};
use log::{info, warn};

use crate::{
    cli::{GlobalArgs, LayoutArgs, SummarizeArgs, SweepArgs, YcsbArgs},
    documents::RandomDocumentGenerator,
    latency::{print_summary, summarize_tree, LatencyLayout},
    sweep::{BenchmarkSweepDriver, LatencyExecutor},
    types::{replicas_for, BenchmarkError, BenchmarkResult, BucketSize, SweepConfig, SweepReport},
    utils::save_json_results,
    ycsb::{run_grid_sweep, GridTarget, ProcessYcsbRunner, YcsbGrid, YcsbWorkloadExecutor},
};

/// Load the inventory and assign the leader
pub fn load_registry(global: &GlobalArgs) -> BenchmarkResult<HostRegistry> {
    let inventory = InventoryConfig::load_from_file(&global.inventory)?;
    let registry = HostRegistry::from_inventory(inventory)?;
    info!(
        "Loaded {} hosts, leader {}",
        registry.hosts().len(),
        registry.endpoint()
    );
    Ok(registry)
}

/// Sweep settings from `--config`, with command-line flags applied on top
pub fn resolve_sweep_config(args: &SweepArgs) -> BenchmarkResult<SweepConfig> {
    let mut config = match &args.config {
        Some(path) => SweepConfig::load_from_file(path)?,
        None => SweepConfig::default(),
    };

    if let Some(docs) = args.data_sample_size {
        config.buckets = BucketSize::standard(docs);
    }
    if let Some(k) = args.operation_sample_size {
        config.operations_to_record = k;
    }
    if !args.durability.is_empty() {
        config.durabilities = args.durability.clone();
    }
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    config.validate()?;
    Ok(config)
}

fn control_plane(global: &GlobalArgs, registry: &HostRegistry) -> CouchbaseCli {
    CouchbaseCli::new(registry.endpoint(), &global.username, &global.password)
        .with_program(&global.cli)
        .with_timeout(Duration::from_secs(global.cli_timeout))
}

/// Rebind the leader by DNS and drop the interim leader again
///
/// On success `registry` and `topology` both target the leader's DNS name and
/// the cluster is back to the leader alone.
pub fn repair_leader<T>(registry: &mut HostRegistry, topology: &mut T) -> BenchmarkResult<()>
where
    T: TopologyController,
{
    let mut repair = LeaderRepair::new(registry)?;
    repair.run(registry, topology)?;

    let interim = repair.interim_leader().address(AddressKind::Dns).to_string();
    info!("Removing interim leader {interim}");
    topology.remove_node(&interim)?;
    topology.rebalance()?;

    info!("Leader now reached at {}", registry.endpoint());
    Ok(())
}

/// Control plane for a sweep: initialized, and rebound by DNS when asked
fn prepare_sweep(
    global: &GlobalArgs,
    args: &SweepArgs,
    registry: &mut HostRegistry,
) -> BenchmarkResult<CouchbaseCli> {
    let mut cli = control_plane(global, registry);
    initialize_cluster(&mut cli);
    if args.repair_leader {
        repair_leader(registry, &mut cli)?;
    }
    Ok(cli)
}

/// Initialize the cluster on the leader with every service
///
/// An already initialized cluster reports an error, which is only logged.
fn initialize_cluster(cli: &mut CouchbaseCli) {
    match cli.init(&ServiceSet::full()) {
        Ok(output) => info!("Cluster initialized: {output}"),
        Err(e) => warn!("Cluster initialization skipped: {e}"),
    }
}

fn latency_executor(
    global: &GlobalArgs,
    registry: &HostRegistry,
    config: &SweepConfig,
) -> LatencyExecutor<QueryServiceClient> {
    let documents =
        QueryServiceClient::new(registry.endpoint(), &global.username, &global.password);
    let generator = config
        .seed
        .map_or_else(RandomDocumentGenerator::new, RandomDocumentGenerator::seeded);
    LatencyExecutor::new(documents, LatencyLayout::new(&config.output_dir), generator)
}

fn finish_sweep(report: &SweepReport, output_dir: &Path) -> BenchmarkResult<()> {
    info!(
        "Sweep finished: {} combinations, {} failed calls{}",
        report.combinations,
        report.failed_calls,
        if report.interrupted { " (interrupted)" } else { "" }
    );
    fs::create_dir_all(output_dir)?;
    save_json_results(report, &output_dir.join("sweep-report.json"))
}

/// Co-located latency sweep over every durability level and cluster size
pub fn run_latency(
    global: &GlobalArgs,
    args: &SweepArgs,
    stop: Arc<AtomicBool>,
) -> BenchmarkResult<SweepReport> {
    let mut registry = load_registry(global)?;
    let config = resolve_sweep_config(args)?;
    let cli = prepare_sweep(global, args, &mut registry)?;

    let mut executor = latency_executor(global, &registry, &config);
    let output_dir = config.output_dir.clone();
    let mut driver =
        BenchmarkSweepDriver::new(registry, cli.clone(), cli, config).with_stop_flag(stop);

    let report = driver.run(&mut executor);
    finish_sweep(&report, &output_dir)?;
    Ok(report)
}

/// Latency sweep over the planned service layouts
pub fn run_layouts(
    global: &GlobalArgs,
    args: &LayoutArgs,
    stop: Arc<AtomicBool>,
) -> BenchmarkResult<SweepReport> {
    let mut registry = load_registry(global)?;
    let config = resolve_sweep_config(&args.sweep)?;
    let layouts = plan_scaling_layouts(registry.followers().len())?;
    let cli = prepare_sweep(global, &args.sweep, &mut registry)?;

    let mut executor = latency_executor(global, &registry, &config);
    let output_dir = config.output_dir.clone();
    let mut driver =
        BenchmarkSweepDriver::new(registry, cli.clone(), cli, config).with_stop_flag(stop);

    let report = driver.run_layout_sweep(&layouts, args.layout_durability, &mut executor)?;
    finish_sweep(&report, &output_dir)?;
    Ok(report)
}

/// YCSB workloads over the full sweep, or over a parameter grid when `--grid`
/// is given
pub fn run_ycsb(global: &GlobalArgs, args: &YcsbArgs, stop: Arc<AtomicBool>) -> BenchmarkResult<()> {
    let mut registry = load_registry(global)?;
    let config = resolve_sweep_config(&args.sweep)?;
    let cli = prepare_sweep(global, &args.sweep, &mut registry)?;
    let mut runner = ProcessYcsbRunner::new(&args.ycsb_home)
        .with_timeout(Duration::from_secs(args.ycsb_timeout));

    if let Some(grid_path) = &args.grid {
        let content = fs::read_to_string(grid_path)
            .with_context(|| format!("Failed to read YCSB grid: {}", grid_path.display()))?;
        let grid: YcsbGrid = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse YCSB grid: {}", grid_path.display()))?;

        let durability = config.durabilities.first().copied().ok_or_else(|| {
            BenchmarkError::Configuration("no durability level configured".to_string())
        })?;
        let target = GridTarget {
            host: registry.endpoint().to_string(),
            bucket: args.bucket.clone(),
            password: args.bucket.clone(),
            durability,
            replicas: replicas_for(registry.followers().len()),
            cluster_size: registry.max_cluster_size(),
            workload: args.workload.clone(),
        };
        let output_dir = config.output_dir.join("ycsb-grid");
        let report = run_grid_sweep(&mut runner, &grid, &target, &output_dir, &stop)?;
        info!(
            "YCSB grid finished: {} completed, {} failed{}",
            report.completed,
            report.failed,
            if report.interrupted { " (interrupted)" } else { "" }
        );
        return Ok(());
    }

    let output_dir = config.output_dir.clone();
    let mut executor =
        YcsbWorkloadExecutor::new(runner, registry.endpoint(), output_dir.join("ycsb-results"));
    let mut driver =
        BenchmarkSweepDriver::new(registry, cli.clone(), cli, config).with_stop_flag(stop);
    let report = driver.run(&mut executor);
    finish_sweep(&report, &output_dir)
}

/// Log the layouts a layout sweep would apply, host by host
pub fn run_plan(global: &GlobalArgs) -> BenchmarkResult<()> {
    let registry = load_registry(global)?;
    let followers = registry.followers();
    let layouts = plan_scaling_layouts(followers.len())?;

    info!("{} layouts over {} followers", layouts.len(), followers.len());
    for layout in &layouts {
        info!("{}: {layout}", layout.simple_name());
        for (host, services) in layout.resolve(followers)? {
            info!("  {} -> {services}", host.private);
        }
    }
    Ok(())
}

pub fn run_clear_cluster(global: &GlobalArgs) -> BenchmarkResult<()> {
    let registry = load_registry(global)?;
    let mut cli = control_plane(global, &registry);
    let failed = cli.clear(registry.followers());
    info!(
        "Cleared cluster: {} of {} followers removed",
        registry.followers().len() - failed,
        registry.followers().len()
    );
    Ok(())
}

pub fn run_flush_bucket(global: &GlobalArgs, name: &str) -> BenchmarkResult<()> {
    let registry = load_registry(global)?;
    let mut cli = control_plane(global, &registry);
    let output = cli.flush_bucket(name)?;
    info!("Flushed bucket {name}: {output}");
    Ok(())
}

pub fn run_repair_leader(global: &GlobalArgs) -> BenchmarkResult<()> {
    let mut registry = load_registry(global)?;
    let mut cli = control_plane(global, &registry);
    repair_leader(&mut registry, &mut cli)
}

pub fn run_summarize(args: &SummarizeArgs) -> BenchmarkResult<()> {
    let results = summarize_tree(&args.dir)?;
    print_summary(&results);
    if let Some(path) = &args.output {
        save_json_results(&results, path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use cbscale_common::{DurabilityLevel, Host};

    use super::*;

    fn global(inventory: &Path) -> GlobalArgs {
        GlobalArgs {
            inventory: inventory.to_path_buf(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            cli: "couchbase-cli".into(),
            cli_timeout: 900,
            verbose: false,
        }
    }

    #[test]
    fn test_flags_override_sweep_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        fs::write(
            &path,
            r#"{"durabilities": ["medium"], "operations_to_record": 7, "output_dir": "from-file"}"#,
        )
        .unwrap();

        let args = SweepArgs {
            config: Some(path),
            data_sample_size: Some(20),
            durability: vec![DurabilityLevel::High],
            ..SweepArgs::default()
        };
        let config = resolve_sweep_config(&args).unwrap();

        assert_eq!(config.durabilities, vec![DurabilityLevel::High]);
        assert_eq!(config.operations_to_record, 7);
        assert_eq!(config.output_dir, Path::new("from-file"));
        assert_eq!(config.buckets, BucketSize::standard(20));
    }

    #[test]
    fn test_defaults_without_file_or_flags() {
        let config = resolve_sweep_config(&SweepArgs::default()).unwrap();
        assert_eq!(config, SweepConfig::default());
    }

    #[test]
    fn test_load_registry_from_inventory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        InventoryConfig {
            hosts: vec![
                Host::new("54.0.0.1", "10.0.0.1", "h1"),
                Host::new("54.0.0.2", "10.0.0.2", "h2"),
            ],
        }
        .save_to_file(&path)
        .unwrap();

        let registry = load_registry(&global(&path)).unwrap();
        assert_eq!(registry.endpoint(), "54.0.0.1");
        assert_eq!(registry.followers().len(), 1);
    }

    fn two_host_inventory(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("inventory.json");
        InventoryConfig {
            hosts: vec![
                Host::new("54.0.0.1", "10.0.0.1", "h1"),
                Host::new("54.0.0.2", "10.0.0.2", "h2"),
            ],
        }
        .save_to_file(&path)
        .unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_repaired_leader_is_used_by_the_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let global = GlobalArgs {
            cli: "true".into(),
            ..global(&two_host_inventory(dir.path()))
        };
        let args = SweepArgs {
            output: Some(dir.path().join("data")),
            repair_leader: true,
            ..SweepArgs::default()
        };
        let config = resolve_sweep_config(&args).unwrap();
        let mut registry = load_registry(&global).unwrap();
        assert_eq!(registry.endpoint(), "54.0.0.1");

        let cli = prepare_sweep(&global, &args, &mut registry).unwrap();

        assert_eq!(registry.endpoint(), "h1");
        assert_eq!(cli.cluster_url(), "couchbase://h1");
        let executor = latency_executor(&global, &registry, &config);
        assert_eq!(executor.commander().client().host(), "h1");
        let driver = BenchmarkSweepDriver::new(registry, cli.clone(), cli, config);
        assert_eq!(driver.registry().endpoint(), "h1");
        assert_eq!(driver.topology().cluster_url(), "couchbase://h1");
    }

    #[cfg(unix)]
    #[test]
    fn test_sweep_without_repair_keeps_public_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let global = GlobalArgs {
            cli: "true".into(),
            ..global(&two_host_inventory(dir.path()))
        };
        let mut registry = load_registry(&global).unwrap();
        let cli = prepare_sweep(&global, &SweepArgs::default(), &mut registry).unwrap();
        assert_eq!(registry.endpoint(), "54.0.0.1");
        assert_eq!(cli.cluster_url(), "couchbase://54.0.0.1");
    }

    #[test]
    fn test_empty_inventory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        fs::write(&path, r#"{"hosts": []}"#).unwrap();
        assert!(matches!(
            load_registry(&global(&path)),
            Err(BenchmarkError::Cluster(cbscale::Error::EmptyInventory))
        ));
    }

    #[test]
    fn test_summarize_saves_json() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("data");
        let file = LatencyLayout::new(&tree).file(
            DurabilityLevel::Low,
            0,
            "small-bucket",
            cbscale_common::OperationKind::Insert,
        );
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, "0.5\n1.5\n").unwrap();
        let output = dir.path().join("summary.json");

        run_summarize(&SummarizeArgs {
            dir: tree,
            output: Some(output.clone()),
        })
        .unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(saved["files"][0]["samples"], 2);
        assert_eq!(saved["files"][0]["avg"], 1.0);
    }
}
