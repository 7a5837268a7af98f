//! Host registry and leader repair
//!
//! The registry holds the static inventory and the leader/follower split. The
//! leader is the fixed entry point for control-plane and client traffic; every
//! other host is a follower that sweeps may add to the cluster.
//!
//! Leader selection is deterministic: the first inventory host is the leader.
//! Keeping it fixed makes repeated experiments address the same machine.

use cbscale_common::{AddressKind, Host, ServiceSet};
use log::{debug, info};

use crate::{
    config::InventoryConfig,
    control::TopologyController,
    error::{Error, Result},
};

#[derive(Debug, Clone)]
pub struct HostRegistry {
    hosts: Vec<Host>,
    leader: Host,
    followers: Vec<Host>,
    endpoint_kind: AddressKind,
}

impl HostRegistry {
    /// Build a registry from inventory hosts and assign roles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInventory`] when `hosts` is empty.
    pub fn load(hosts: Vec<Host>) -> Result<Self> {
        let leader = hosts.first().cloned().ok_or(Error::EmptyInventory)?;
        let mut registry = Self {
            hosts,
            leader,
            followers: Vec::new(),
            endpoint_kind: AddressKind::Public,
        };
        registry.assign_roles();
        Ok(registry)
    }

    pub fn from_inventory(inventory: InventoryConfig) -> Result<Self> {
        Self::load(inventory.hosts)
    }

    /// Make the first inventory host the leader and everything else a follower.
    ///
    /// Also resets the endpoint to the leader's public address, undoing a
    /// previous leader repair.
    pub fn assign_roles(&mut self) {
        self.leader = self.hosts[0].clone();
        self.followers = self.hosts[1..].to_vec();
        self.endpoint_kind = AddressKind::Public;
        info!("Leader: {}", self.leader);
        info!(
            "Followers: {:?}",
            self.follower_addresses(AddressKind::Private)
        );
    }

    #[must_use]
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    #[must_use]
    pub fn leader(&self) -> &Host {
        &self.leader
    }

    /// Non-leader hosts in inventory order
    #[must_use]
    pub fn followers(&self) -> &[Host] {
        &self.followers
    }

    #[must_use]
    pub fn leader_address(&self, kind: AddressKind) -> &str {
        self.leader.address(kind)
    }

    #[must_use]
    pub fn follower_addresses(&self, kind: AddressKind) -> Vec<&str> {
        self.followers.iter().map(|f| f.address(kind)).collect()
    }

    /// Total number of hosts, leader included
    #[must_use]
    pub fn max_cluster_size(&self) -> usize {
        self.hosts.len()
    }

    /// Address kind used to reach the leader
    #[must_use]
    pub fn endpoint_kind(&self) -> AddressKind {
        self.endpoint_kind
    }

    /// Address clients and the control plane use to reach the leader
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.leader.address(self.endpoint_kind)
    }

    /// Make `host` the leader, reached through its `kind` address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `host` is not in the inventory.
    pub fn designate_leader(&mut self, host: &Host, kind: AddressKind) -> Result<()> {
        if !self.hosts.contains(host) {
            return Err(Error::config(format!("{host} is not in the inventory")));
        }
        self.leader = host.clone();
        self.followers = self.hosts.iter().filter(|h| *h != host).cloned().collect();
        self.endpoint_kind = kind;
        info!("Designated {} as leader", host.address(kind));
        Ok(())
    }
}

/// Where the leader's cluster identity currently stands during repair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderBinding {
    /// The leader is a cluster member known by this address kind
    Bound(AddressKind),
    /// The leader has been removed from the cluster
    Removed,
    /// A different host has joined by this address kind and serves as interim leader
    ReAdded(AddressKind),
}

/// Recovery procedure for a leader the control plane bound to its private
/// address.
///
/// ```text
/// Bound(Private) -> Removed -> ReAdded(Dns) -> Bound(Dns)
/// ```
///
/// Each [`step`](Self::step) performs one transition: a membership call then a
/// rebalance. If either call fails the state does not advance, and a retried
/// step resumes with the call that failed. Invoke once after initial cluster
/// creation when DNS-stable addressing is required.
#[derive(Debug, Clone)]
pub struct LeaderRepair {
    original: Host,
    helper: Host,
    state: LeaderBinding,
    membership_done: bool,
}

impl LeaderRepair {
    /// Prepare a repair of the registry's current leader. The first follower
    /// acts as the interim leader.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the registry has no follower.
    pub fn new(registry: &HostRegistry) -> Result<Self> {
        let helper = registry.followers().first().cloned().ok_or_else(|| {
            Error::config("leader repair needs at least one follower to act as interim leader")
        })?;
        Ok(Self {
            original: registry.leader().clone(),
            helper,
            state: LeaderBinding::Bound(AddressKind::Private),
            membership_done: false,
        })
    }

    /// Follower that leads the cluster while the original leader is re-added.
    /// It stays a member, bound by DNS, once the repair completes.
    #[must_use]
    pub fn interim_leader(&self) -> &Host {
        &self.helper
    }

    #[must_use]
    pub fn state(&self) -> LeaderBinding {
        self.state
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == LeaderBinding::Bound(AddressKind::Dns)
    }

    /// Perform the next transition. A no-op once the leader is bound by DNS.
    pub fn step<T>(&mut self, registry: &mut HostRegistry, topology: &mut T) -> Result<LeaderBinding>
    where
        T: TopologyController + ?Sized,
    {
        let next = match self.state {
            LeaderBinding::Bound(AddressKind::Dns) => return Ok(self.state),
            LeaderBinding::Bound(_) => {
                if !self.membership_done {
                    info!(
                        "Removing mis-bound leader {}",
                        self.original.address(AddressKind::Private)
                    );
                    topology.remove_node(self.original.address(AddressKind::Private))?;
                    self.membership_done = true;
                }
                LeaderBinding::Removed
            }
            LeaderBinding::Removed => {
                if !self.membership_done {
                    info!(
                        "Re-adding {} by DNS as interim leader",
                        self.helper.address(AddressKind::Dns)
                    );
                    topology.add_node(self.helper.address(AddressKind::Dns), &ServiceSet::full())?;
                    self.membership_done = true;
                }
                LeaderBinding::ReAdded(AddressKind::Dns)
            }
            LeaderBinding::ReAdded(_) => {
                if !self.membership_done {
                    info!(
                        "Re-adding original leader {} by DNS",
                        self.original.address(AddressKind::Dns)
                    );
                    topology
                        .add_node(self.original.address(AddressKind::Dns), &ServiceSet::full())?;
                    self.membership_done = true;
                }
                LeaderBinding::Bound(AddressKind::Dns)
            }
        };

        let output = topology.rebalance()?;
        debug!("{output}");

        match next {
            LeaderBinding::ReAdded(kind) => {
                registry.designate_leader(&self.helper, kind)?;
                topology.retarget(registry.endpoint());
            }
            LeaderBinding::Bound(kind) => {
                registry.designate_leader(&self.original, kind)?;
                topology.retarget(registry.endpoint());
            }
            LeaderBinding::Removed => {}
        }

        self.state = next;
        self.membership_done = false;
        info!("Leader repair state: {next:?}");
        Ok(next)
    }

    /// Step until the leader is bound by DNS, stopping at the first error.
    pub fn run<T>(&mut self, registry: &mut HostRegistry, topology: &mut T) -> Result<()>
    where
        T: TopologyController + ?Sized,
    {
        while !self.is_complete() {
            self.step(registry, topology)?;
        }
        Ok(())
    }
}
