//! Cluster-side building blocks for Couchbase scaling benchmarks
//!
//! - [`registry`]: host inventory, leader/follower roles and leader repair
//! - [`layout`]: service layouts and the tier-by-tier scaling planner
//! - [`control`]: collaborator traits for topology, buckets and documents
//! - [`couchbase_cli`] / [`http_client`]: the real collaborator backends
//! - [`process`]: external tool invocation bounded by a timeout

pub mod config;
pub mod control;
pub mod couchbase_cli;
pub mod error;
pub mod http_client;
pub mod layout;
pub mod process;
pub mod registry;

pub use config::InventoryConfig;
pub use control::{BucketController, BucketSpec, DocumentClient, Keyspace, TopologyController, UserSpec};
pub use couchbase_cli::CouchbaseCli;
pub use error::{Error, Result};
pub use http_client::QueryServiceClient;
pub use layout::{colocated_assignment, plan_scaling_layouts, ServiceLayout};
pub use registry::{HostRegistry, LeaderBinding, LeaderRepair};
