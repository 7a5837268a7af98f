//! Common types and constants for the cbscale cluster benchmark.
//!
//! This crate holds the plain value types shared by the cluster library and the
//! benchmark driver: host records, service tiers, durability levels and
//! operation kinds. Nothing in here performs I/O.

pub mod constants;
pub mod host;
pub mod kind;
pub mod service;

pub use host::{AddressKind, Host};
pub use kind::{DurabilityLevel, OperationKind, ParseTokenError};
pub use service::{Service, ServiceSet};
