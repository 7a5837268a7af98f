use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a textual token does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what}: {token:?}")]
pub struct ParseTokenError {
    what: &'static str,
    token: String,
}

impl ParseTokenError {
    #[must_use]
    pub fn new(what: &'static str, token: &str) -> Self {
        Self {
            what,
            token: token.to_string(),
        }
    }
}

/// Named write-acknowledgement strength used by the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityLevel {
    /// Acknowledged once a majority of replicas hold the write in memory.
    Low,
    /// Majority in memory and persisted on the active node.
    Medium,
    /// Persisted on a majority of replicas.
    High,
}

impl DurabilityLevel {
    /// All levels in sweep order.
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// The server-side durability requirement this level maps to.
    #[must_use]
    #[inline]
    pub const fn server_level(self) -> &'static str {
        match self {
            Self::Low => "majority",
            Self::Medium => "majorityAndPersistActive",
            Self::High => "persistToMajority",
        }
    }
}

impl fmt::Display for DurabilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

impl FromStr for DurabilityLevel {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(ParseTokenError::new("durability level", other)),
        }
    }
}

/// The database operations the benchmark times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
    N1qlQuery,
    FullTextSearch,
}

impl OperationKind {
    /// Order in which one sweep step runs the kinds. Inserts come first so the
    /// later kinds have documents to work on, deletes come last.
    pub const SWEEP_ORDER: [Self; 5] = [
        Self::Insert,
        Self::N1qlQuery,
        Self::FullTextSearch,
        Self::Update,
        Self::Delete,
    ];

    /// Directory token used in the latency output tree.
    #[must_use]
    #[inline]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::N1qlQuery => "n1qlselect",
            Self::FullTextSearch => "fts",
        }
    }

    /// Whether the operation mutates documents and carries a durability level.
    #[must_use]
    #[inline]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for OperationKind {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::SWEEP_ORDER
            .into_iter()
            .find(|kind| kind.token() == s)
            .ok_or_else(|| ParseTokenError::new("operation kind", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durability_server_levels() {
        assert_eq!(DurabilityLevel::Low.server_level(), "majority");
        assert_eq!(
            DurabilityLevel::Medium.server_level(),
            "majorityAndPersistActive"
        );
        assert_eq!(DurabilityLevel::High.server_level(), "persistToMajority");
    }

    #[test]
    fn test_durability_parse() {
        assert_eq!("medium".parse::<DurabilityLevel>(), Ok(DurabilityLevel::Medium));
        let err = "extreme".parse::<DurabilityLevel>().unwrap_err();
        assert_eq!(err.to_string(), "unknown durability level: \"extreme\"");
    }

    #[test]
    fn test_operation_kind_tokens() {
        assert_eq!(OperationKind::N1qlQuery.token(), "n1qlselect");
        assert_eq!("fts".parse::<OperationKind>(), Ok(OperationKind::FullTextSearch));
        assert!(OperationKind::Delete.is_write());
        assert!(!OperationKind::FullTextSearch.is_write());
    }
}
