//! Dependency graph over a subset of domains
//!
//! Edges point from a domain to the domains it depends on. Strongly connected
//! components (Tarjan) become atomic groups; the condensation is layered with
//! Kahn's algorithm so every component lands after everything it depends on.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use super::model::DomainMap;

/// Directed dependency graph: `a -> b` means `a` depends on `b`
pub struct DomainGraph {
    graph: DiGraph<String, f64>,
    index: HashMap<String, NodeIndex>,
}

impl DomainGraph {
    /// Graph over `domains`, keeping only relationships between them
    pub fn for_domains(map: &DomainMap, domains: &[String]) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        let mut sorted: Vec<&String> = domains.iter().collect();
        sorted.sort();
        sorted.dedup();
        for name in sorted {
            index.insert(name.clone(), graph.add_node(name.clone()));
        }

        for rel in &map.relationships {
            if rel.source == rel.target {
                continue;
            }
            if let (Some(&from), Some(&to)) = (index.get(&rel.source), index.get(&rel.target)) {
                graph.add_edge(from, to, rel.strength);
            }
        }

        Self { graph, index }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Domains `name` depends on, within this graph
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Domains that depend on `name`, within this graph
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let set: BTreeSet<String> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        set.into_iter().collect()
    }

    /// Components with more than one member (dependency cycles), members sorted
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut names: Vec<String> =
                    scc.into_iter().map(|i| self.graph[i].clone()).collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Dependency layers of strongly connected components.
    ///
    /// Layer `n` only depends on layers `< n`. Within a layer, components are
    /// sorted by their first member's name; members of a component are sorted.
    pub fn layered_components(&self) -> Vec<Vec<Vec<String>>> {
        let sccs = tarjan_scc(&self.graph);

        let mut component_of: HashMap<NodeIndex, usize> = HashMap::new();
        let mut members: Vec<Vec<String>> = Vec::with_capacity(sccs.len());
        for (c, scc) in sccs.iter().enumerate() {
            let mut names: Vec<String> = scc.iter().map(|&i| self.graph[i].clone()).collect();
            names.sort();
            members.push(names);
            for &idx in scc {
                component_of.insert(idx, c);
            }
        }

        // deps[c] = components c depends on
        let mut deps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); sccs.len()];
        for edge in self.graph.edge_references() {
            let from = component_of[&edge.source()];
            let to = component_of[&edge.target()];
            if from != to {
                deps[from].insert(to);
            }
        }

        let mut remaining: BTreeMap<String, usize> = members
            .iter()
            .enumerate()
            .map(|(c, names)| (names[0].clone(), c))
            .collect();
        let mut placed: BTreeSet<usize> = BTreeSet::new();
        let mut layers = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<usize> = remaining
                .values()
                .copied()
                .filter(|c| deps[*c].iter().all(|d| placed.contains(d)))
                .collect();
            // The condensation is acyclic, so something is always ready
            if ready.is_empty() {
                break;
            }
            let mut layer = Vec::with_capacity(ready.len());
            for c in ready {
                remaining.remove(&members[c][0]);
                placed.insert(c);
                layer.push(members[c].clone());
            }
            layers.push(layer);
        }

        layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Domain, DomainRelationship, RelationshipType};
    use chrono::Utc;
    use std::path::PathBuf;

    fn map_with(edges: &[(&str, &str)], domains: &[&str]) -> DomainMap {
        DomainMap {
            domains: domains
                .iter()
                .map(|d| (d.to_string(), Domain::new(*d, PathBuf::from(d))))
                .collect(),
            relationships: edges
                .iter()
                .map(|(s, t)| {
                    DomainRelationship::new(
                        *s,
                        *t,
                        RelationshipType::Uses,
                        0.5,
                        vec![format!("{}/x.cs", s)],
                        "",
                    )
                })
                .collect(),
            isolated_domains: vec![],
            cross_cutting_concerns: vec![],
            project_root: PathBuf::from("/repo"),
            generated_at: Utc::now(),
        }
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_layers_follow_dependencies() {
        // Orders -> Billing -> Core, Reports -> Core
        let map = map_with(
            &[("Orders", "Billing"), ("Billing", "Core"), ("Reports", "Core")],
            &["Orders", "Billing", "Core", "Reports"],
        );
        let graph = DomainGraph::for_domains(&map, &names(&["Orders", "Billing", "Core", "Reports"]));
        let layers = graph.layered_components();

        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0], vec![names(&["Core"])]);
        assert_eq!(layers[1], vec![names(&["Billing"]), names(&["Reports"])]);
        assert_eq!(layers[2], vec![names(&["Orders"])]);
    }

    #[test]
    fn test_cycle_becomes_one_component() {
        let map = map_with(
            &[("A", "B"), ("B", "A"), ("C", "A")],
            &["A", "B", "C"],
        );
        let graph = DomainGraph::for_domains(&map, &names(&["A", "B", "C"]));

        assert_eq!(graph.cycles(), vec![names(&["A", "B"])]);
        let layers = graph.layered_components();
        assert_eq!(layers, vec![vec![names(&["A", "B"])], vec![names(&["C"])]]);
    }

    #[test]
    fn test_edges_outside_subset_are_ignored() {
        let map = map_with(&[("A", "B")], &["A", "B"]);
        let graph = DomainGraph::for_domains(&map, &names(&["A"]));
        assert!(graph.dependencies("A").is_empty());
        assert_eq!(graph.layered_components(), vec![vec![names(&["A"])]]);
    }

    #[test]
    fn test_dependents() {
        let map = map_with(&[("Orders", "Billing"), ("Reports", "Billing")], &["Orders", "Billing", "Reports"]);
        let graph = DomainGraph::for_domains(&map, &names(&["Orders", "Billing", "Reports"]));
        assert_eq!(graph.dependents("Billing"), names(&["Orders", "Reports"]));
        assert_eq!(graph.dependencies("Orders"), names(&["Billing"]));
    }
}
