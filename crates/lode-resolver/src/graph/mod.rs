//! Resolution graph using petgraph
//!
//! Nodes are the selected packages, edges point from a package to each
//! package it requires. Cycles are legal in resolved sets and are only
//! reported for diagnostics.

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use lode_core::types::{PackageIdentity, Version, VersionConstraint};

/// A package chosen by the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub identity: PackageIdentity,
    pub version: Version,
    /// Hash reported by the registry for the chosen distribution
    pub content_hash: String,
    /// Extras activated on this package
    pub extras: BTreeSet<String>,
    /// Required by the project itself
    pub direct: bool,
}

/// The requirement a package placed on one of its dependencies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementEdge {
    pub constraint: VersionConstraint,
    pub extras: BTreeSet<String>,
    pub marker: Option<String>,
}

/// Resolved packages and the requirements between them
#[derive(Debug, Clone, Default)]
pub struct ResolutionGraph {
    graph: DiGraph<ResolvedPackage, RequirementEdge>,
    index: HashMap<PackageIdentity, NodeIndex>,
}

impl ResolutionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package; an identity already present keeps its node
    pub fn add_package(&mut self, package: ResolvedPackage) -> NodeIndex {
        if let Some(&existing) = self.index.get(&package.identity) {
            return existing;
        }
        let identity = package.identity.clone();
        let node = self.graph.add_node(package);
        self.index.insert(identity, node);
        node
    }

    /// Record that `from` requires `to`; `None` when either is missing
    pub fn add_requirement(
        &mut self,
        from: &PackageIdentity,
        to: &PackageIdentity,
        edge: RequirementEdge,
    ) -> Option<EdgeIndex> {
        let from = *self.index.get(from)?;
        let to = *self.index.get(to)?;
        Some(self.graph.add_edge(from, to, edge))
    }

    pub fn get(&self, identity: &PackageIdentity) -> Option<&ResolvedPackage> {
        self.index
            .get(identity)
            .and_then(|&node| self.graph.node_weight(node))
    }

    /// Packages in `(name, registry)` order
    pub fn packages(&self) -> Vec<&ResolvedPackage> {
        let mut packages: Vec<&ResolvedPackage> = self.graph.node_weights().collect();
        packages.sort_by(|a, b| a.identity.sort_key().cmp(&b.identity.sort_key()));
        packages
    }

    /// Packages the project requires directly
    pub fn roots(&self) -> Vec<&PackageIdentity> {
        self.packages()
            .into_iter()
            .filter(|package| package.direct)
            .map(|package| &package.identity)
            .collect()
    }

    /// Packages that require `identity`, sorted and without duplicates
    pub fn required_by(&self, identity: &PackageIdentity) -> Vec<&PackageIdentity> {
        self.neighbors(identity, Direction::Incoming)
    }

    /// Packages `identity` requires, sorted and without duplicates
    pub fn dependencies_of(&self, identity: &PackageIdentity) -> Vec<&PackageIdentity> {
        self.neighbors(identity, Direction::Outgoing)
    }

    /// Requirements other packages placed on `identity`, by requester
    pub fn constraints_on(&self, identity: &PackageIdentity) -> Vec<(&PackageIdentity, &RequirementEdge)> {
        let Some(&node) = self.index.get(identity) else {
            return Vec::new();
        };
        let mut constraints: Vec<(&PackageIdentity, &RequirementEdge)> = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .filter_map(|edge| {
                let parent = self.graph.node_weight(edge.source())?;
                Some((&parent.identity, edge.weight()))
            })
            .collect();
        constraints.sort_by(|a, b| a.0.sort_key().cmp(&b.0.sort_key()));
        constraints
    }

    fn neighbors(&self, identity: &PackageIdentity, direction: Direction) -> Vec<&PackageIdentity> {
        let Some(&node) = self.index.get(identity) else {
            return Vec::new();
        };
        let mut neighbors: Vec<&PackageIdentity> = self
            .graph
            .edges_directed(node, direction)
            .map(|edge| match direction {
                Direction::Incoming => edge.source(),
                Direction::Outgoing => edge.target(),
            })
            .filter(|&other| other != node)
            .filter_map(|other| self.graph.node_weight(other))
            .map(|package| &package.identity)
            .collect();
        neighbors.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        neighbors.dedup();
        neighbors
    }

    /// Groups of packages that require each other, each group and the list sorted
    pub fn cycles(&self) -> Vec<Vec<PackageIdentity>> {
        let mut cycles: Vec<Vec<PackageIdentity>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut members: Vec<PackageIdentity> = component
                    .into_iter()
                    .filter_map(|node| self.graph.node_weight(node))
                    .map(|package| package.identity.clone())
                    .collect();
                members.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
                members
            })
            .collect();
        cycles.sort_by(|a, b| {
            let a: Vec<_> = a.iter().map(PackageIdentity::sort_key).collect();
            let b: Vec<_> = b.iter().map(PackageIdentity::sort_key).collect();
            a.cmp(&b)
        });
        cycles
    }

    /// Format a cycle as `a@pypi -> b@pypi -> a@pypi`
    pub fn format_cycle(cycle: &[PackageIdentity]) -> String {
        let mut labels: Vec<String> = cycle.iter().map(PackageIdentity::label).collect();
        if let Some(first) = labels.first().cloned() {
            labels.push(first);
        }
        labels.join(" -> ")
    }

    pub fn package_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn requirement_count(&self) -> usize {
        self.graph.edge_count()
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use lode_core::types::Registry;
    use proptest::prelude::*;
    use std::sync::Arc;

    proptest! {
        #[test]
        fn cycle_members_reach_each_other(
            num_packages in 2usize..7,
            edges in prop::collection::vec((0usize..6, 0usize..6), 0..14)
        ) {
            let pypi = Arc::new(Registry::default_index());
            let mut graph = ResolutionGraph::new();
            let identities: Vec<PackageIdentity> = (0..num_packages)
                .map(|i| PackageIdentity::new(&format!("pkg{}", i), Arc::clone(&pypi)).unwrap())
                .collect();
            for identity in &identities {
                graph.add_package(ResolvedPackage {
                    identity: identity.clone(),
                    version: "1.0".parse().unwrap(),
                    content_hash: String::new(),
                    extras: BTreeSet::new(),
                    direct: false,
                });
            }
            for (from, to) in edges {
                if from < num_packages && to < num_packages && from != to {
                    graph.add_requirement(&identities[from], &identities[to], RequirementEdge {
                        constraint: VersionConstraint::any(),
                        extras: BTreeSet::new(),
                        marker: None,
                    });
                }
            }

            // Every cycle member has a predecessor inside its own cycle
            for cycle in graph.cycles() {
                prop_assert!(cycle.len() > 1);
                for member in &cycle {
                    let parents = graph.required_by(member);
                    prop_assert!(parents.iter().any(|parent| cycle.contains(parent)));
                }
            }
        }
    }
}
