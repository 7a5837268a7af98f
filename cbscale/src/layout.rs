//! Service layouts and the scaling planner
//!
//! A [`ServiceLayout`] says which service tiers run on the follower hosts of
//! one experiment round:
//!
//! - services placed on every host
//! - services placed on exactly N hosts
//! - services placed on the hosts left over once the counted services are placed
//!
//! Every node must run the data service and may only run `{data}`,
//! `{data,index,query}` or `{data,index,query,fts}`, so the planner scales one
//! tier at a time on top of the previous one.

use std::collections::BTreeMap;

use cbscale_common::{Host, Service, ServiceSet};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLayout {
    services_on_all_hosts: ServiceSet,
    service_counts: BTreeMap<Service, usize>,
    services_on_remaining_hosts: ServiceSet,
}

impl ServiceLayout {
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a service appears both in
    /// `services_on_all_hosts` and as a key of `service_counts`.
    pub fn new(
        services_on_all_hosts: ServiceSet,
        service_counts: BTreeMap<Service, usize>,
        services_on_remaining_hosts: ServiceSet,
    ) -> Result<Self> {
        if let Some(service) = service_counts
            .keys()
            .find(|s| services_on_all_hosts.contains(**s))
        {
            return Err(Error::config(format!(
                "service {service} is listed both on all hosts and with a host count"
            )));
        }
        Ok(Self {
            services_on_all_hosts,
            service_counts,
            services_on_remaining_hosts,
        })
    }

    #[must_use]
    pub fn services_on_all_hosts(&self) -> &ServiceSet {
        &self.services_on_all_hosts
    }

    #[must_use]
    pub fn service_counts(&self) -> &BTreeMap<Service, usize> {
        &self.service_counts
    }

    #[must_use]
    pub fn services_on_remaining_hosts(&self) -> &ServiceSet {
        &self.services_on_remaining_hosts
    }

    /// Number of hosts claimed by the counted services
    #[must_use]
    pub fn counted_hosts(&self) -> usize {
        self.service_counts.values().copied().max().unwrap_or(0)
    }

    /// Name usable as a file or directory component,
    /// e.g. `ALLdata-2index2queryREMAINING`.
    #[must_use]
    pub fn simple_name(&self) -> String {
        let mut name = format!("ALL{}-", self.services_on_all_hosts.join("-"));
        for (service, count) in &self.service_counts {
            name.push_str(&format!("{count}{service}"));
        }
        name.push_str("REMAINING");
        name.push_str(&self.services_on_remaining_hosts.join("-"));
        name
    }

    /// Map the layout onto concrete hosts.
    ///
    /// Host `j` (0-based) runs the all-host services, every counted service
    /// whose count exceeds `j`, and the remaining-host services once `j` is
    /// past the counted hosts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a count exceeds the number of hosts
    /// or a host would end up with a combination the platform rejects.
    pub fn resolve(&self, hosts: &[Host]) -> Result<Vec<(Host, ServiceSet)>> {
        let counted = self.counted_hosts();
        if counted > hosts.len() {
            return Err(Error::config(format!(
                "layout {} needs {counted} hosts but only {} are available",
                self.simple_name(),
                hosts.len()
            )));
        }

        hosts
            .iter()
            .enumerate()
            .map(|(j, host)| {
                let mut services = self.services_on_all_hosts.clone();
                for (service, count) in &self.service_counts {
                    if j < *count {
                        services.insert(*service);
                    }
                }
                if j >= counted {
                    services = services.union(&self.services_on_remaining_hosts);
                }
                if !services.is_valid_node_combination() {
                    return Err(Error::config(format!(
                        "layout {} puts invalid service combination {{{services}}} on {}",
                        self.simple_name(),
                        host.private
                    )));
                }
                Ok((host.clone(), services))
            })
            .collect()
    }
}

impl std::fmt::Display for ServiceLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ServiceLayout(all_nodes={{{}}}, n_nodes={:?}, remaining_nodes={{{}}})",
            self.services_on_all_hosts, self.service_counts, self.services_on_remaining_hosts
        )
    }
}

/// Layouts that scale one service tier at a time across `followers` hosts.
///
/// Phase 1 puts `{data,index,query}` on 1..=F hosts with `{data}` on the rest.
/// Phase 2 puts `{data,index,query,fts}` on 1..=F hosts with
/// `{data,index,query}` on the rest. Returns 2F layouts, phase by phase.
pub fn plan_scaling_layouts(followers: usize) -> Result<Vec<ServiceLayout>> {
    let mut layouts = Vec::with_capacity(2 * followers);

    for i in 1..=followers {
        layouts.push(ServiceLayout::new(
            ServiceSet::data_only(),
            BTreeMap::from([(Service::Index, i), (Service::Query, i)]),
            ServiceSet::new(),
        )?);
    }

    for i in 1..=followers {
        layouts.push(ServiceLayout::new(
            ServiceSet::data_index_query(),
            BTreeMap::from([(Service::Fts, i)]),
            ServiceSet::new(),
        )?);
    }

    Ok(layouts)
}

/// Co-located policy: the first `cluster_size` followers run every service.
#[must_use]
pub fn colocated_assignment(followers: &[Host], cluster_size: usize) -> Vec<(Host, ServiceSet)> {
    followers
        .iter()
        .take(cluster_size)
        .map(|host| (host.clone(), ServiceSet::full()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(n: usize) -> Vec<Host> {
        (1..=n)
            .map(|i| Host::new(format!("p{i}"), format!("10.0.0.{i}"), format!("h{i}")))
            .collect()
    }

    fn count_with(assignment: &[(Host, ServiceSet)], services: &ServiceSet) -> usize {
        assignment.iter().filter(|(_, s)| s == services).count()
    }

    #[test]
    fn test_overlapping_services_are_rejected() {
        let err = ServiceLayout::new(
            ServiceSet::data_only(),
            BTreeMap::from([(Service::Data, 2)]),
            ServiceSet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_plan_yields_two_phases() {
        let followers = hosts(4);
        let layouts = plan_scaling_layouts(followers.len()).unwrap();
        assert_eq!(layouts.len(), 8);

        for (idx, layout) in layouts.iter().enumerate() {
            assert!(layout
                .service_counts()
                .keys()
                .all(|s| !layout.services_on_all_hosts().contains(*s)));

            let assignment = layout.resolve(&followers).unwrap();
            assert_eq!(assignment.len(), 4);
            if idx < 4 {
                let i = idx + 1;
                assert_eq!(count_with(&assignment, &ServiceSet::data_index_query()), i);
                assert_eq!(count_with(&assignment, &ServiceSet::data_only()), 4 - i);
            } else {
                let i = idx - 3;
                assert_eq!(count_with(&assignment, &ServiceSet::full()), i);
                assert_eq!(count_with(&assignment, &ServiceSet::data_index_query()), 4 - i);
            }
        }
    }

    #[test]
    fn test_plan_with_no_followers_is_empty() {
        assert!(plan_scaling_layouts(0).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_places_counted_services_first() {
        let layout = ServiceLayout::new(
            ServiceSet::data_only(),
            BTreeMap::from([(Service::Index, 1), (Service::Query, 1)]),
            ServiceSet::new(),
        )
        .unwrap();
        let assignment = layout.resolve(&hosts(3)).unwrap();
        assert_eq!(assignment[0].1, ServiceSet::data_index_query());
        assert_eq!(assignment[1].1, ServiceSet::data_only());
        assert_eq!(assignment[2].1, ServiceSet::data_only());
    }

    #[test]
    fn test_resolve_applies_remaining_services() {
        let layout = ServiceLayout::new(
            ServiceSet::data_index_query(),
            BTreeMap::from([(Service::Fts, 1)]),
            ServiceSet::new(),
        )
        .unwrap();
        let remaining: ServiceSet = [Service::Index, Service::Query].into_iter().collect();
        let with_remaining = ServiceLayout::new(
            ServiceSet::data_only(),
            BTreeMap::new(),
            remaining,
        )
        .unwrap();

        let assignment = with_remaining.resolve(&hosts(2)).unwrap();
        assert!(assignment
            .iter()
            .all(|(_, s)| *s == ServiceSet::data_index_query()));
        assert_eq!(layout.resolve(&hosts(2)).unwrap()[0].1, ServiceSet::full());
    }

    #[test]
    fn test_resolve_rejects_invalid_combinations() {
        // fts without index/query is not a platform-valid node.
        let layout = ServiceLayout::new(
            ServiceSet::data_only(),
            BTreeMap::from([(Service::Fts, 1)]),
            ServiceSet::new(),
        )
        .unwrap();
        assert!(layout.resolve(&hosts(2)).is_err());
    }

    #[test]
    fn test_resolve_rejects_oversized_counts() {
        let layout = ServiceLayout::new(
            ServiceSet::data_index_query(),
            BTreeMap::from([(Service::Fts, 3)]),
            ServiceSet::new(),
        )
        .unwrap();
        assert!(layout.resolve(&hosts(2)).is_err());
    }

    #[test]
    fn test_simple_name() {
        let layouts = plan_scaling_layouts(2).unwrap();
        assert_eq!(layouts[1].simple_name(), "ALLdata-2index2queryREMAINING");
        assert_eq!(layouts[2].simple_name(), "ALLdata-index-query-1ftsREMAINING");
    }

    #[test]
    fn test_colocated_assignment() {
        let followers = hosts(4);
        let assignment = colocated_assignment(&followers, 2);
        assert_eq!(assignment.len(), 2);
        assert_eq!(assignment[0].0, followers[0]);
        assert!(assignment.iter().all(|(_, s)| *s == ServiceSet::full()));
        assert!(colocated_assignment(&followers, 0).is_empty());
        assert_eq!(colocated_assignment(&followers, 9).len(), 4);
    }
}
