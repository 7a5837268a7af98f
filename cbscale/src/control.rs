//! Collaborator boundary between the benchmark core and the live cluster
//!
//! The core only decides *what* to request. Everything that actually talks to
//! the cluster sits behind these traits:
//!
//! - [`TopologyController`]: node membership and rebalancing
//! - [`BucketController`]: buckets, scopes, collections, indexes and users
//! - [`DocumentClient`]: the timed data operations
//!
//! All calls are blocking. A controller returns the collaborator's output text
//! on success so callers can log it.

use std::time::Duration;

use cbscale_common::{
    constants::{DEFAULT_COLLECTION, DEFAULT_SCOPE},
    DurabilityLevel, Host, ServiceSet,
};
use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::error::Result;

/// Node membership operations against the cluster
pub trait TopologyController {
    /// Initialize a fresh cluster on the leader with the given services
    fn init(&mut self, services: &ServiceSet) -> Result<String>;

    /// Add a node by address with the given services
    fn add_node(&mut self, address: &str, services: &ServiceSet) -> Result<String>;

    /// Remove a node by address
    fn remove_node(&mut self, address: &str) -> Result<String>;

    /// Redistribute data after membership changes. Returns once the rebalance
    /// has completed.
    fn rebalance(&mut self) -> Result<String>;

    /// Register `public_address` as the externally reachable address of `node`
    fn set_alternate_address(&mut self, node: &str, public_address: &str) -> Result<String>;

    /// Point subsequent calls at a new leader endpoint. Backends bound to a
    /// fixed endpoint override this; the default ignores it.
    fn retarget(&mut self, _endpoint: &str) {}

    /// Remove every given host by private address. Hosts that are not
    /// members fail individually; returns the number of failed removals.
    fn clear(&mut self, hosts: &[Host]) -> usize {
        let mut failed = 0;
        for host in hosts {
            info!("Removing node {}", host.private);
            match self.remove_node(&host.private) {
                Ok(output) => debug!("{output}"),
                Err(e) => {
                    warn!("Could not remove {}: {e}", host.private);
                    failed += 1;
                }
            }
        }
        failed
    }
}

/// Parameters for creating or editing a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSpec {
    pub name: String,
    pub ram_quota_mb: u32,
    pub replicas: u32,
}

/// A user created with access to a single bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSpec {
    pub username: String,
    pub password: String,
    pub role: String,
    pub bucket: String,
}

/// Bucket management operations
pub trait BucketController {
    fn create_bucket(&mut self, bucket: &BucketSpec) -> Result<String>;

    fn edit_bucket(&mut self, bucket: &BucketSpec) -> Result<String>;

    /// Delete every document in the bucket
    fn flush_bucket(&mut self, name: &str) -> Result<String>;

    fn create_scope(&mut self, bucket: &str, scope: &str) -> Result<String>;

    fn create_collection(&mut self, bucket: &str, scope: &str, name: &str) -> Result<String>;

    fn create_primary_index(&mut self, bucket: &str) -> Result<String>;

    fn create_user(&mut self, user: &UserSpec) -> Result<String>;

    /// Create the bucket, or edit it in place with the same parameters when it
    /// already exists. Never produces a duplicate.
    fn create_or_edit_bucket(&mut self, bucket: &BucketSpec) -> Result<String> {
        info!(
            "Creating bucket {} with RAM quota {}MB and {} replicas",
            bucket.name, bucket.ram_quota_mb, bucket.replicas
        );
        match self.create_bucket(bucket) {
            Err(e) if e.is_already_exists() => {
                info!(
                    "Bucket {} already exists, applying updates (replicas={})",
                    bucket.name, bucket.replicas
                );
                self.edit_bucket(bucket)
            }
            other => other,
        }
    }
}

/// Fully qualified target of a key-value operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    pub bucket: String,
    pub scope: String,
    pub collection: String,
}

impl Keyspace {
    #[must_use]
    pub fn new(
        bucket: impl Into<String>,
        scope: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            scope: scope.into(),
            collection: collection.into(),
        }
    }

    /// Keyspace using the default scope and collection names
    #[must_use]
    pub fn in_bucket(bucket: impl Into<String>) -> Self {
        Self::new(bucket, DEFAULT_SCOPE, DEFAULT_COLLECTION)
    }

    /// Backtick-quoted `bucket`.`scope`.`collection` path for query statements
    #[must_use]
    pub fn path(&self) -> String {
        format!("`{}`.`{}`.`{}`", self.bucket, self.scope, self.collection)
    }
}

/// Data operations the benchmark times
///
/// Writes fail with [`crate::Error::DocumentConflict`] when inserting an
/// existing key and with [`crate::Error::OperationTimeout`] when a call
/// exceeds `timeout`.
pub trait DocumentClient {
    fn insert(
        &mut self,
        keyspace: &Keyspace,
        key: &str,
        document: &Value,
        durability: DurabilityLevel,
        timeout: Duration,
    ) -> Result<()>;

    fn replace(
        &mut self,
        keyspace: &Keyspace,
        key: &str,
        document: &Value,
        durability: DurabilityLevel,
        timeout: Duration,
    ) -> Result<()>;

    fn remove(
        &mut self,
        keyspace: &Keyspace,
        key: &str,
        durability: DurabilityLevel,
        timeout: Duration,
    ) -> Result<()>;

    /// Run a N1QL statement with named parameters, returning the result rows
    fn query(
        &mut self,
        statement: &str,
        params: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<Vec<Value>>;

    /// Run a full-text query string against a search index, returning the hit count
    fn search(&mut self, index: &str, text: &str, timeout: Duration) -> Result<u64>;
}


#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{testing::RecordingTopology, *};
    use crate::error::Error;

    #[derive(Default)]
    struct MemoryBuckets {
        buckets: HashMap<String, u32>,
        calls: Vec<String>,
    }

    impl BucketController for MemoryBuckets {
        fn create_bucket(&mut self, bucket: &BucketSpec) -> Result<String> {
            self.calls.push(format!("create {}", bucket.name));
            if self.buckets.contains_key(&bucket.name) {
                return Err(Error::external(
                    "bucket-create",
                    "ERROR: name - Bucket with given name already exists",
                ));
            }
            self.buckets.insert(bucket.name.clone(), bucket.replicas);
            Ok("SUCCESS: Bucket created".to_string())
        }
        fn edit_bucket(&mut self, bucket: &BucketSpec) -> Result<String> {
            self.calls.push(format!("edit {}", bucket.name));
            self.buckets.insert(bucket.name.clone(), bucket.replicas);
            Ok("SUCCESS: Bucket edited".to_string())
        }
        fn flush_bucket(&mut self, _name: &str) -> Result<String> {
            unimplemented!()
        }
        fn create_scope(&mut self, _bucket: &str, _scope: &str) -> Result<String> {
            unimplemented!()
        }
        fn create_collection(&mut self, _bucket: &str, _scope: &str, _name: &str) -> Result<String> {
            unimplemented!()
        }
        fn create_primary_index(&mut self, _bucket: &str) -> Result<String> {
            unimplemented!()
        }
        fn create_user(&mut self, _user: &UserSpec) -> Result<String> {
            unimplemented!()
        }
    }

    #[test]
    fn test_create_or_edit_bucket_is_idempotent() {
        let mut buckets = MemoryBuckets::default();
        let mut spec = BucketSpec {
            name: "small-bucket".to_string(),
            ram_quota_mb: 1024,
            replicas: 0,
        };

        buckets.create_or_edit_bucket(&spec).unwrap();
        spec.replicas = 1;
        buckets.create_or_edit_bucket(&spec).unwrap();

        assert_eq!(buckets.buckets.len(), 1);
        assert_eq!(buckets.buckets["small-bucket"], 1);
        assert_eq!(
            buckets.calls,
            vec!["create small-bucket", "create small-bucket", "edit small-bucket"]
        );
    }

    #[test]
    fn test_clear_removes_by_private_address_and_continues() {
        let mut topology = RecordingTopology::default();
        let hosts = vec![
            Host::new("p1", "10.0.0.1", "n1"),
            Host::new("p2", "10.0.0.2", "n2"),
        ];

        assert_eq!(topology.clear(&hosts), 0);
        assert_eq!(topology.calls, vec!["remove 10.0.0.1", "remove 10.0.0.2"]);

        topology.calls.clear();
        topology.fail_prefixes = vec!["remove 10.0.0.1".to_string()];
        assert_eq!(topology.clear(&hosts), 1);
        assert_eq!(topology.calls, vec!["remove 10.0.0.1", "remove 10.0.0.2"]);
    }

    #[test]
    fn test_keyspace_path() {
        assert_eq!(
            Keyspace::in_bucket("small-bucket").path(),
            "`small-bucket`.`default_scope`.`default_collection`"
        );
    }
}
