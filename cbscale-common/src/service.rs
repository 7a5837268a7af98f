//! Service tiers a cluster node can run.
//!
//! The platform only accepts three nested combinations per node: `{data}`,
//! `{data,index,query}` and `{data,index,query,fts}`. Scaling experiments are
//! therefore expressed as tiers rather than independent service toggles.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::kind::ParseTokenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Data,
    Index,
    Query,
    Fts,
}

impl Service {
    #[must_use]
    #[inline]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Index => "index",
            Self::Query => "query",
            Self::Fts => "fts",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Service {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "data" => Ok(Self::Data),
            "index" => Ok(Self::Index),
            "query" => Ok(Self::Query),
            "fts" => Ok(Self::Fts),
            other => Err(ParseTokenError::new("service", other)),
        }
    }
}

/// An ordered set of services.
///
/// `Display` renders the comma-joined form the control plane expects, e.g.
/// `data,index,query`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceSet(BTreeSet<Service>);

impl ServiceSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn data_only() -> Self {
        [Service::Data].into_iter().collect()
    }

    #[must_use]
    pub fn data_index_query() -> Self {
        [Service::Data, Service::Index, Service::Query]
            .into_iter()
            .collect()
    }

    /// Every service the benchmark uses, co-located on one node.
    #[must_use]
    pub fn full() -> Self {
        [Service::Data, Service::Index, Service::Query, Service::Fts]
            .into_iter()
            .collect()
    }

    #[must_use]
    #[inline]
    pub fn contains(&self, service: Service) -> bool {
        self.0.contains(&service)
    }

    pub fn insert(&mut self, service: Service) -> bool {
        self.0.insert(service)
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.0.union(&other.0).copied().collect()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Service> + '_ {
        self.0.iter().copied()
    }

    /// Whether a single node may run exactly this set.
    #[must_use]
    pub fn is_valid_node_combination(&self) -> bool {
        *self == Self::data_only() || *self == Self::data_index_query() || *self == Self::full()
    }

    /// Services joined with `sep`, used for file-system friendly names.
    #[must_use]
    pub fn join(&self, sep: &str) -> String {
        self.iter().map(Service::token).collect::<Vec<_>>().join(sep)
    }
}

impl FromIterator<Service> for ServiceSet {
    fn from_iter<I: IntoIterator<Item = Service>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ServiceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join(","))
    }
}

impl FromStr for ServiceSet {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .filter(|token| !token.trim().is_empty())
            .map(str::parse::<Service>)
            .collect()
    }
}
