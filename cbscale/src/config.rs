//! Host inventory file support
//!
//! The inventory is a JSON document listing the machines available to the
//! benchmark:
//!
//! ```json
//! { "hosts": [ { "public": "54.1.2.3", "private": "10.0.0.3", "dns": "node3.internal" } ] }
//! ```

use std::{collections::HashSet, fs, path::Path};

use anyhow::{Context, Result};
use cbscale_common::{AddressKind, Host};
use serde::{Deserialize, Serialize};

/// The host inventory as read from disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Machines in inventory order; the first one becomes the leader
    pub hosts: Vec<Host>,
}

impl InventoryConfig {
    /// Load the inventory from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read inventory file: {}", path.as_ref().display())
        })?;

        let config: Self = serde_json::from_str(&content).with_context(|| {
            format!("Failed to parse inventory file: {}", path.as_ref().display())
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Save the inventory to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize inventory")?;

        fs::write(path.as_ref(), content).with_context(|| {
            format!("Failed to write inventory file: {}", path.as_ref().display())
        })?;

        Ok(())
    }

    /// Reject inventories where two hosts share an address.
    ///
    /// An empty inventory passes here; it is refused when the registry is
    /// built from it.
    pub fn validate(&self) -> Result<()> {
        for kind in [AddressKind::Public, AddressKind::Private, AddressKind::Dns] {
            let mut seen = HashSet::new();
            for host in &self.hosts {
                let address = host.address(kind);
                if address.is_empty() {
                    anyhow::bail!("Host {host} has an empty {kind} address");
                }
                if !seen.insert(address) {
                    anyhow::bail!("Duplicate {kind} address: {address}");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory() -> InventoryConfig {
        InventoryConfig {
            hosts: vec![
                Host::new("54.0.0.1", "10.0.0.1", "node1.internal"),
                Host::new("54.0.0.2", "10.0.0.2", "node2.internal"),
            ],
        }
    }

    #[test]
    fn test_inventory_validation() {
        assert!(inventory().validate().is_ok());
        assert!(InventoryConfig::default().validate().is_ok());

        let mut bad = inventory();
        bad.hosts[1].private = bad.hosts[0].private.clone();
        assert!(bad.validate().is_err());

        let mut bad = inventory();
        bad.hosts[1].dns = String::new();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_inventory_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.json");

        inventory().save_to_file(&path).unwrap();
        let loaded = InventoryConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.hosts, inventory().hosts);
    }

    #[test]
    fn test_inventory_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(InventoryConfig::load_from_file(dir.path().join("missing.json")).is_err());

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"hosts\": [").unwrap();
        let err = InventoryConfig::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse inventory file"));
    }
}
