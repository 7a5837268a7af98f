use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::kind::ParseTokenError;

/// A machine from the host inventory.
///
/// Hosts are immutable once loaded; two hosts are the same host when all three
/// addresses match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    /// Address reachable from outside the private network.
    pub public: String,
    /// Address used between cluster members.
    pub private: String,
    /// Stable DNS name of the machine.
    pub dns: String,
}

impl Host {
    #[must_use]
    pub fn new(
        public: impl Into<String>,
        private: impl Into<String>,
        dns: impl Into<String>,
    ) -> Self {
        Self {
            public: public.into(),
            private: private.into(),
            dns: dns.into(),
        }
    }

    /// Returns the address of the requested kind.
    #[must_use]
    #[inline]
    pub fn address(&self, kind: AddressKind) -> &str {
        match kind {
            AddressKind::Public => &self.public,
            AddressKind::Private => &self.private,
            AddressKind::Dns => &self.dns,
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (private={}, dns={})", self.public, self.private, self.dns)
    }
}

/// Which of a host's addresses to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    Public,
    Private,
    Dns,
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Dns => "dns",
        })
    }
}

impl FromStr for AddressKind {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            "dns" => Ok(Self::Dns),
            other => Err(ParseTokenError::new("address kind", other)),
        }
    }
}
