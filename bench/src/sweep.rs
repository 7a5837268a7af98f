//! Benchmark sweep driver
//!
//! The sweep walks durability level, then cluster size, then bucket, then
//! workload. Between cluster sizes the driver reconciles cluster membership to
//! the co-located assignment; around every bucket's workloads it prepares and
//! flushes the bucket. A failing collaborator call is logged and counted, and
//! the sweep moves on.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use cbscale::{
    colocated_assignment, BucketController, BucketSpec, DocumentClient, HostRegistry, Keyspace,
    ServiceLayout, TopologyController, UserSpec,
};
use cbscale_common::{
    constants::BUCKET_USER_ROLE, DurabilityLevel, Host, OperationKind, ServiceSet,
};
use log::{debug, error, info, warn};

use crate::{
    documents::RandomDocumentGenerator,
    latency::LatencyLayout,
    operations::{Operation, OperationCommander},
    types::{
        replicas_for, BenchmarkError, BenchmarkParameters, BenchmarkResult, BucketSize,
        SweepConfig, SweepReport,
    },
};

/// What a workload needs to know about the bucket round it runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    pub keyspace: Keyspace,
    /// Documents the bucket is filled with
    pub docs: usize,
    pub operations_to_record: usize,
    /// Layout name during a layout sweep
    pub layout: Option<String>,
}

/// Runs the innermost level of the sweep
pub trait WorkloadExecutor {
    /// Workload identifiers, in execution order, run for every bucket round
    fn workloads(&self) -> Vec<String>;

    fn execute(&mut self, params: &BenchmarkParameters, step: &StepContext) -> BenchmarkResult<()>;
}

pub struct BenchmarkSweepDriver<T, B> {
    registry: HostRegistry,
    topology: T,
    buckets: B,
    config: SweepConfig,
    /// Followers currently in the cluster, as far as successful calls tell
    members: Vec<(Host, ServiceSet)>,
    stop: Arc<AtomicBool>,
}

/// Log a collaborator call's outcome, counting failures
fn note(report: &mut SweepReport, action: &str, result: cbscale::Result<String>) -> bool {
    match result {
        Ok(output) => {
            debug!("{action}: {output}");
            true
        }
        Err(e) => {
            error!("Failed to {action}: {e}");
            report.failed_calls += 1;
            false
        }
    }
}

impl<T, B> BenchmarkSweepDriver<T, B>
where
    T: TopologyController,
    B: BucketController,
{
    pub fn new(registry: HostRegistry, topology: T, buckets: B, config: SweepConfig) -> Self {
        Self {
            registry,
            topology,
            buckets,
            config,
            members: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a stop flag; once set, the sweep winds down at the next
    /// combination boundary.
    #[must_use]
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn registry(&self) -> &HostRegistry {
        &self.registry
    }

    pub fn topology(&self) -> &T {
        &self.topology
    }

    pub fn buckets(&self) -> &B {
        &self.buckets
    }

    pub fn members(&self) -> &[(Host, ServiceSet)] {
        &self.members
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Full sweep with the co-located policy: every follower in the cluster
    /// runs every service.
    pub fn run<E>(&mut self, executor: &mut E) -> SweepReport
    where
        E: WorkloadExecutor + ?Sized,
    {
        let mut report = SweepReport::default();
        let durabilities = self.config.durabilities.clone();

        'sweep: for durability in durabilities {
            info!("=== Durability level: {durability} ===");
            for cluster_size in 0..self.registry.max_cluster_size() {
                if report.interrupted || self.stop_requested() {
                    report.interrupted = true;
                    break 'sweep;
                }
                info!("=== Cluster size: {} nodes ===", cluster_size + 1);

                let target = colocated_assignment(self.registry.followers(), cluster_size);
                self.reconcile(&target, &mut report);
                self.refresh_alternate_addresses(&mut report);
                self.run_buckets(durability, cluster_size, None, executor, &mut report);
            }
        }

        if report.interrupted {
            warn!("Sweep interrupted after {} combinations", report.combinations);
        }
        report
    }

    /// Sweep over service layouts at a fixed durability level
    ///
    /// Every layout is resolved against the followers before the cluster is
    /// touched, so an unsatisfiable layout fails the whole sweep up front.
    pub fn run_layout_sweep<E>(
        &mut self,
        layouts: &[ServiceLayout],
        durability: DurabilityLevel,
        executor: &mut E,
    ) -> BenchmarkResult<SweepReport>
    where
        E: WorkloadExecutor + ?Sized,
    {
        let followers = self.registry.followers();
        let resolved = layouts
            .iter()
            .map(|layout| Ok((layout.simple_name(), layout.resolve(followers)?)))
            .collect::<cbscale::Result<Vec<_>>>()?;

        let mut report = SweepReport::default();
        for (name, assignment) in resolved {
            if report.interrupted || self.stop_requested() {
                report.interrupted = true;
                break;
            }
            info!("=== Service layout: {name} ===");

            self.reconcile(&[], &mut report);
            self.reconcile(&assignment, &mut report);
            self.refresh_alternate_addresses(&mut report);
            self.run_buckets(
                durability,
                assignment.len(),
                Some(&name),
                executor,
                &mut report,
            );
        }
        Ok(report)
    }

    /// Bring follower membership in line with `target`
    ///
    /// Members not in `target` are removed, then missing hosts are added by
    /// private address. Any successful change is followed by one rebalance.
    fn reconcile(&mut self, target: &[(Host, ServiceSet)], report: &mut SweepReport) {
        let stale: Vec<Host> = self
            .members
            .iter()
            .filter(|member| !target.contains(member))
            .map(|(host, _)| host.clone())
            .collect();
        let mut changed = false;
        for host in stale {
            info!("Removing node {}", host.private);
            let result = self.topology.remove_node(&host.private);
            if note(report, &format!("remove node {}", host.private), result) {
                self.members.retain(|(member, _)| *member != host);
                changed = true;
            }
        }

        for (host, services) in target {
            if self.members.iter().any(|(member, _)| member == host) {
                continue;
            }
            info!("Adding node {} with services {services}", host.private);
            let result = self.topology.add_node(&host.private, services);
            if note(report, &format!("add node {}", host.private), result) {
                self.members.push((host.clone(), services.clone()));
                changed = true;
            }
        }

        if changed {
            info!("Rebalancing cluster");
            let result = self.topology.rebalance();
            note(report, "rebalance cluster", result);
        }
    }

    fn refresh_alternate_addresses(&mut self, report: &mut SweepReport) {
        let nodes: Vec<Host> = std::iter::once(self.registry.leader().clone())
            .chain(self.members.iter().map(|(host, _)| host.clone()))
            .collect();
        for host in nodes {
            let result = self
                .topology
                .set_alternate_address(&host.private, &host.public);
            note(
                report,
                &format!("set alternate address of {}", host.private),
                result,
            );
        }
    }

    fn prepare_bucket(&mut self, bucket: &BucketSize, cluster_size: usize, report: &mut SweepReport) {
        let label = bucket.label.as_str();
        let spec = BucketSpec {
            name: label.to_string(),
            ram_quota_mb: self.config.bucket_ram_mb,
            replicas: replicas_for(cluster_size),
        };
        let result = self.buckets.create_or_edit_bucket(&spec);
        note(report, &format!("create bucket {label}"), result);

        let user = UserSpec {
            username: label.to_string(),
            password: label.to_string(),
            role: BUCKET_USER_ROLE.to_string(),
            bucket: label.to_string(),
        };
        let result = self.buckets.create_user(&user);
        note(report, &format!("create user for {label}"), result);

        let result = self.buckets.flush_bucket(label);
        note(report, &format!("flush bucket {label}"), result);

        let result = self.buckets.create_scope(label, &self.config.scope);
        note(report, &format!("create scope in {label}"), result);

        let result = self.buckets.create_primary_index(label);
        note(report, &format!("create primary index on {label}"), result);

        let result = self
            .buckets
            .create_collection(label, &self.config.scope, &self.config.collection);
        note(report, &format!("create collection in {label}"), result);
    }

    fn run_buckets<E>(
        &mut self,
        durability: DurabilityLevel,
        cluster_size: usize,
        layout: Option<&str>,
        executor: &mut E,
        report: &mut SweepReport,
    ) where
        E: WorkloadExecutor + ?Sized,
    {
        let buckets = self.config.buckets.clone();
        for bucket in &buckets {
            if self.stop_requested() {
                report.interrupted = true;
                return;
            }
            info!("=== Bucket: {} ({} docs) ===", bucket.label, bucket.docs);
            self.prepare_bucket(bucket, cluster_size, report);

            let step = StepContext {
                keyspace: Keyspace::new(&bucket.label, &self.config.scope, &self.config.collection),
                docs: bucket.docs,
                operations_to_record: self.config.operations_to_record,
                layout: layout.map(str::to_string),
            };
            for workload in executor.workloads() {
                if self.stop_requested() {
                    report.interrupted = true;
                    break;
                }
                let params = BenchmarkParameters {
                    durability,
                    cluster_size,
                    bucket_label: bucket.label.clone(),
                    workload_id: workload,
                };
                info!(
                    "Running {} on {} (durability {durability}, {} nodes)",
                    params.workload_id,
                    params.bucket_label,
                    params.total_nodes()
                );
                report.combinations += 1;
                if let Err(e) = executor.execute(&params, &step) {
                    error!(
                        "Workload {} failed on {}: {e}",
                        params.workload_id, params.bucket_label
                    );
                    report.failed_calls += 1;
                }
            }

            let result = self.buckets.flush_bucket(&bucket.label);
            note(report, &format!("flush bucket {}", bucket.label), result);
            if report.interrupted {
                return;
            }
        }
    }
}

/// Timed operation workloads, one per operation kind
///
/// Inserts fill the bucket and record the first K; every other kind runs K
/// operations over keys `0..K`.
pub struct LatencyExecutor<C> {
    commander: OperationCommander<C>,
    generator: RandomDocumentGenerator,
    output: LatencyLayout,
}

impl<C: DocumentClient> LatencyExecutor<C> {
    pub fn new(client: C, output: LatencyLayout, generator: RandomDocumentGenerator) -> Self {
        Self {
            commander: OperationCommander::new(client, Keyspace::in_bucket("default")),
            generator,
            output,
        }
    }

    pub fn commander(&self) -> &OperationCommander<C> {
        &self.commander
    }
}

impl<C: DocumentClient> WorkloadExecutor for LatencyExecutor<C> {
    fn workloads(&self) -> Vec<String> {
        OperationKind::SWEEP_ORDER
            .iter()
            .map(|kind| kind.token().to_string())
            .collect()
    }

    fn execute(&mut self, params: &BenchmarkParameters, step: &StepContext) -> BenchmarkResult<()> {
        let kind: OperationKind = params
            .workload_id
            .parse()
            .map_err(|e| BenchmarkError::Configuration(format!("{e}")))?;

        let output = match &step.layout {
            Some(name) => self.output.for_layout(name.as_str()),
            None => self.output.clone(),
        };
        let path = output.file(
            params.durability,
            params.cluster_size,
            &params.bucket_label,
            kind,
        );
        self.commander.set_keyspace(step.keyspace.clone());
        self.commander.bind_latency_file(kind, path);

        let durability = params.durability;
        let record_first = step.operations_to_record;
        let count = match kind {
            OperationKind::Insert => step.docs,
            _ => record_first,
        };
        let keyspace = &step.keyspace;
        let generator = &mut self.generator;

        let report = self.commander.run_batch(kind, count, record_first, |i| match kind {
            OperationKind::Insert => Operation::Insert {
                key: i.to_string(),
                document: generator.random_document(),
                durability,
            },
            OperationKind::Update => Operation::Update {
                key: i.to_string(),
                document: generator.random_document(),
                durability,
            },
            OperationKind::Delete => Operation::Delete {
                key: i.to_string(),
                durability,
            },
            OperationKind::N1qlQuery => Operation::phrase_query(keyspace, generator.random_phrase()),
            OperationKind::FullTextSearch => {
                Operation::phrase_search(&keyspace.bucket, generator.random_phrase())
            }
        });

        info!(
            "{kind}: {} executed, {} recorded, {} conflicts, {} timeouts, {} failed",
            report.executed, report.recorded, report.conflicts, report.timeouts, report.failed
        );
        if count > 0 && report.executed == 0 {
            return Err(BenchmarkError::Internal(format!(
                "no {kind} operation succeeded on {}",
                params.bucket_label
            )));
        }
        Ok(())
    }
}
