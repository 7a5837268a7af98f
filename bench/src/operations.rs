//! Timed database operations
//!
//! An [`Operation`] is one data call against the cluster. The
//! [`OperationCommander`] executes operations, times each call and appends the
//! latency of recorded operations to the latency file bound for its kind.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use cbscale::{DocumentClient, Keyspace};
use cbscale_common::{
    constants::{OPERATION_TIMEOUT, PHRASE_FIELD},
    DurabilityLevel, OperationKind,
};
use log::{debug, error, trace, warn};
use serde_json::{Map, Value};

use crate::{
    types::{BatchReport, BenchmarkError, BenchmarkResult},
    utils::append_latency,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Insert {
        key: String,
        document: Value,
        durability: DurabilityLevel,
    },
    Update {
        key: String,
        document: Value,
        durability: DurabilityLevel,
    },
    Delete {
        key: String,
        durability: DurabilityLevel,
    },
    N1qlQuery {
        statement: String,
        phrase: String,
    },
    FullTextSearch {
        index: String,
        phrase: String,
    },
}

/// Name of the full-text index the search workload queries for `bucket`
#[must_use]
pub fn search_index_name(bucket: &str) -> String {
    format!("default_primary_index_{}", bucket.replace('-', "_"))
}

impl Operation {
    /// Select every document of `keyspace` whose phrase field equals `phrase`
    #[must_use]
    pub fn phrase_query(keyspace: &Keyspace, phrase: impl Into<String>) -> Self {
        Self::N1qlQuery {
            statement: format!(
                "SELECT * FROM {} WHERE {PHRASE_FIELD} = $phrase",
                keyspace.path()
            ),
            phrase: phrase.into(),
        }
    }

    /// Search the bucket's full-text index for `phrase`
    #[must_use]
    pub fn phrase_search(bucket: &str, phrase: impl Into<String>) -> Self {
        Self::FullTextSearch {
            index: search_index_name(bucket),
            phrase: phrase.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Insert { .. } => OperationKind::Insert,
            Self::Update { .. } => OperationKind::Update,
            Self::Delete { .. } => OperationKind::Delete,
            Self::N1qlQuery { .. } => OperationKind::N1qlQuery,
            Self::FullTextSearch { .. } => OperationKind::FullTextSearch,
        }
    }

    /// Durability of a write; reads carry none
    #[must_use]
    pub const fn durability(&self) -> Option<DurabilityLevel> {
        match self {
            Self::Insert { durability, .. }
            | Self::Update { durability, .. }
            | Self::Delete { durability, .. } => Some(*durability),
            Self::N1qlQuery { .. } | Self::FullTextSearch { .. } => None,
        }
    }

    /// Perform the call, bounded by the operation timeout
    pub fn execute<C>(&self, client: &mut C, keyspace: &Keyspace) -> cbscale::Result<()>
    where
        C: DocumentClient + ?Sized,
    {
        match self {
            Self::Insert {
                key,
                document,
                durability,
            } => client.insert(keyspace, key, document, *durability, OPERATION_TIMEOUT),
            Self::Update {
                key,
                document,
                durability,
            } => client.replace(keyspace, key, document, *durability, OPERATION_TIMEOUT),
            Self::Delete { key, durability } => {
                client.remove(keyspace, key, *durability, OPERATION_TIMEOUT)
            }
            Self::N1qlQuery { statement, phrase } => {
                let mut params = Map::new();
                params.insert("phrase".to_string(), Value::String(phrase.clone()));
                let rows = client.query(statement, &params, OPERATION_TIMEOUT)?;
                trace!("Query for {phrase:?} returned {} rows", rows.len());
                Ok(())
            }
            Self::FullTextSearch { index, phrase } => {
                let hits = client.search(index, phrase, OPERATION_TIMEOUT)?;
                trace!("Search for {phrase:?} on {index} returned {hits} hits");
                Ok(())
            }
        }
    }
}

/// Executes operations against one keyspace and records their latencies
pub struct OperationCommander<C> {
    client: C,
    keyspace: Keyspace,
    latency_files: HashMap<OperationKind, PathBuf>,
    history: HashMap<OperationKind, Vec<Operation>>,
}

impl<C: DocumentClient> OperationCommander<C> {
    pub fn new(client: C, keyspace: Keyspace) -> Self {
        Self {
            client,
            keyspace,
            latency_files: HashMap::new(),
            history: HashMap::new(),
        }
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub fn set_keyspace(&mut self, keyspace: Keyspace) {
        self.keyspace = keyspace;
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Latencies of recorded `kind` operations are appended to `path` from now on
    pub fn bind_latency_file(&mut self, kind: OperationKind, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!("Recording {kind} latencies to {}", path.display());
        self.latency_files.insert(kind, path);
    }

    pub fn latency_file(&self, kind: OperationKind) -> Option<&Path> {
        self.latency_files.get(&kind).map(PathBuf::as_path)
    }

    /// Operations recorded so far, per kind
    pub fn history(&self, kind: OperationKind) -> &[Operation] {
        self.history.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Execute `operation`, timing the call
    ///
    /// When `record` is set and the call succeeds, the latency in seconds is
    /// appended to the kind's latency file and the operation is kept in the
    /// history. A failed call is never recorded.
    pub fn execute_operation(
        &mut self,
        operation: Operation,
        record: bool,
    ) -> BenchmarkResult<Duration> {
        let kind = operation.kind();
        let path = if record {
            let path = self.latency_files.get(&kind).ok_or_else(|| {
                BenchmarkError::Configuration(format!("no latency file bound for {kind}"))
            })?;
            Some(path.clone())
        } else {
            None
        };

        let start = Instant::now();
        operation.execute(&mut self.client, &self.keyspace)?;
        let elapsed = start.elapsed();

        if let Some(path) = path {
            append_latency(&path, elapsed)?;
            self.history.entry(kind).or_default().push(operation);
        }
        Ok(elapsed)
    }

    /// Execute `count` operations built by `make_operation`, recording the
    /// first `record_first` by position
    ///
    /// Failed operations still use up their position, are logged and counted,
    /// and never stop the batch. An operation of another kind than `kind` is
    /// not executed and counts as failed.
    pub fn run_batch<F>(
        &mut self,
        kind: OperationKind,
        count: usize,
        record_first: usize,
        mut make_operation: F,
    ) -> BatchReport
    where
        F: FnMut(usize) -> Operation,
    {
        let mut report = BatchReport::default();

        for index in 0..count {
            let operation = make_operation(index);
            if operation.kind() != kind {
                error!(
                    "{kind} #{index} failed: batch built a {} operation",
                    operation.kind()
                );
                report.failed += 1;
                continue;
            }
            let record = index < record_first;
            match self.execute_operation(operation, record) {
                Ok(_) => {
                    report.executed += 1;
                    if record {
                        report.recorded += 1;
                    }
                }
                Err(BenchmarkError::Cluster(e)) if e.is_conflict() => {
                    warn!("{kind} #{index} skipped: {e}");
                    report.conflicts += 1;
                }
                Err(BenchmarkError::Cluster(e)) if e.is_timeout() => {
                    warn!("{kind} #{index} skipped: {e}");
                    report.timeouts += 1;
                }
                Err(e) => {
                    error!("{kind} #{index} failed: {e}");
                    report.failed += 1;
                }
            }
        }

        report
    }
}


#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::{testing::MemoryDocuments, *};

    fn commander() -> OperationCommander<MemoryDocuments> {
        OperationCommander::new(MemoryDocuments::default(), Keyspace::in_bucket("small-bucket"))
    }

    fn insert(key: usize) -> Operation {
        Operation::Insert {
            key: key.to_string(),
            document: json!({ "vandy_phrase": "nashville", "n": key }),
            durability: DurabilityLevel::Low,
        }
    }

    fn line_count(path: &Path) -> usize {
        fs::read_to_string(path).unwrap().lines().count()
    }

    #[test]
    fn test_search_index_name() {
        assert_eq!(
            search_index_name("small-bucket"),
            "default_primary_index_small_bucket"
        );
    }

    #[test]
    fn test_operation_kind_and_durability() {
        let keyspace = Keyspace::in_bucket("b");
        assert_eq!(insert(1).kind(), OperationKind::Insert);
        assert_eq!(insert(1).durability(), Some(DurabilityLevel::Low));

        let query = Operation::phrase_query(&keyspace, "vandy");
        assert_eq!(query.kind(), OperationKind::N1qlQuery);
        assert_eq!(query.durability(), None);
        match query {
            Operation::N1qlQuery { statement, .. } => assert_eq!(
                statement,
                "SELECT * FROM `b`.`default_scope`.`default_collection` WHERE vandy_phrase = $phrase"
            ),
            other => panic!("unexpected operation {other:?}"),
        }
    }

    #[test]
    fn test_recorded_operation_appends_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("insert/latencies.txt");
        let mut commander = commander();
        commander.bind_latency_file(OperationKind::Insert, &path);

        commander.execute_operation(insert(0), true).unwrap();
        commander.execute_operation(insert(1), false).unwrap();

        assert_eq!(line_count(&path), 1);
        assert_eq!(commander.history(OperationKind::Insert), &[insert(0)]);
        assert_eq!(commander.client().documents.len(), 2);
    }

    #[test]
    fn test_recording_without_bound_file_is_rejected() {
        let mut commander = commander();
        let result = commander.execute_operation(insert(0), true);
        assert!(matches!(result, Err(BenchmarkError::Configuration(_))));
        assert!(commander.client().documents.is_empty());
    }

    #[test]
    fn test_failed_operation_is_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latencies.txt");
        let mut commander = commander();
        commander.bind_latency_file(OperationKind::Insert, &path);

        commander.execute_operation(insert(0), true).unwrap();
        let duplicate = commander.execute_operation(insert(0), true);

        assert!(
            matches!(duplicate, Err(BenchmarkError::Cluster(ref e)) if e.is_conflict()),
            "expected a conflict, got {duplicate:?}"
        );
        assert_eq!(line_count(&path), 1);
        assert_eq!(commander.history(OperationKind::Insert).len(), 1);
    }

    #[test]
    fn test_batch_records_only_the_first_k() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latencies.txt");
        let mut commander = commander();
        commander.bind_latency_file(OperationKind::Insert, &path);

        let report = commander.run_batch(OperationKind::Insert, 10, 4, insert);
        assert_eq!(report.executed, 10);
        assert_eq!(report.recorded, 4);
        assert_eq!(line_count(&path), 4);

        let path = dir.path().join("small.txt");
        commander.bind_latency_file(OperationKind::Update, &path);
        let report = commander.run_batch(OperationKind::Update, 3, 100, |i| Operation::Update {
            key: i.to_string(),
            document: json!({}),
            durability: DurabilityLevel::High,
        });
        assert_eq!(report.recorded, 3);
        assert_eq!(line_count(&path), 3);
    }

    #[test]
    fn test_batch_continues_past_conflicts_and_timeouts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latencies.txt");
        let mut commander = commander();
        commander.bind_latency_file(OperationKind::Insert, &path);
        commander.execute_operation(insert(1), false).unwrap();
        commander.client.slow_keys.insert("3".to_string());

        let report = commander.run_batch(OperationKind::Insert, 5, 5, insert);
        assert_eq!(report.conflicts, 1);
        assert_eq!(report.timeouts, 1);
        assert_eq!(report.executed, 3);
        assert_eq!(report.recorded, 3);
        assert_eq!(line_count(&path), 3);
    }

    #[test]
    fn test_batch_rejects_operations_of_another_kind() {
        let dir = tempfile::tempdir().unwrap();
        let inserts = dir.path().join("insert.txt");
        let deletes = dir.path().join("delete.txt");
        let mut commander = commander();
        commander.bind_latency_file(OperationKind::Insert, &inserts);
        commander.bind_latency_file(OperationKind::Delete, &deletes);
        commander.execute_operation(insert(0), false).unwrap();

        let report = commander.run_batch(OperationKind::Insert, 3, 3, |i| Operation::Delete {
            key: i.to_string(),
            durability: DurabilityLevel::Low,
        });

        assert_eq!(report.failed, 3);
        assert_eq!(report.executed, 0);
        assert!(!inserts.exists());
        assert!(!deletes.exists());
        assert_eq!(commander.client().documents.len(), 1);
    }

    #[test]
    fn test_reads_reach_the_client() {
        let dir = tempfile::tempdir().unwrap();
        let mut commander = commander();
        commander.bind_latency_file(OperationKind::FullTextSearch, dir.path().join("fts.txt"));
        commander.bind_latency_file(OperationKind::N1qlQuery, dir.path().join("n1ql.txt"));
        commander.execute_operation(insert(0), false).unwrap();

        let keyspace = commander.keyspace().clone();
        commander
            .execute_operation(Operation::phrase_query(&keyspace, "nashville"), true)
            .unwrap();
        commander
            .execute_operation(Operation::phrase_search("small-bucket", "nashville"), true)
            .unwrap();

        assert_eq!(commander.client().queries.len(), 1);
        assert_eq!(
            commander.client().searches,
            vec!["default_primary_index_small_bucket nashville".to_string()]
        );
        assert_eq!(commander.history(OperationKind::N1qlQuery).len(), 1);
    }
}
