//! Change impact prediction
//!
//! Impact travels against relationship direction: for `B -> A` (B relies on
//! A), a change in A reaches B. Traversal is an iterative breadth-first search
//! with a visited map and depth counter, so depth strictly increases along
//! every traversal edge and never reaches the configured maximum.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use super::model::{
    clamp_unit, DomainMap, ImpactEdge, ImpactGraph, ImpactLevel, ImpactNode, ImpactPrediction,
    PropagationPath, SpecificDomainsImpact,
};
use super::naming::location_for_path;
use super::risk::{assess_risks, estimate_update_time_ms, recommendations_for, update_priority};
use crate::config::ImpactConfig;
use crate::error::{GatewayError, Result};

/// Depth limit used when transitive impacts are not requested
pub const NON_TRANSITIVE_DEPTH: usize = 2;

/// Upper bound on propagation paths reconstructed per reached domain
const MAX_PATHS_PER_DOMAIN: usize = 16;

/// Per-domain bookkeeping of one traversal
#[derive(Debug, Default)]
pub struct Propagation {
    pub depth: HashMap<String, usize>,
    /// Best product of edge strengths over shortest paths
    pub best_score: HashMap<String, f64>,
    /// Number of distinct shortest paths
    pub path_count: HashMap<String, usize>,
    /// Predecessors on shortest paths, with the edge strength used
    pub parents: HashMap<String, Vec<(String, f64)>>,
}

impl Propagation {
    pub fn impact_score(&self, domain: &str) -> f64 {
        let best = self.best_score.get(domain).copied().unwrap_or(0.0);
        let paths = self.path_count.get(domain).copied().unwrap_or(1).max(1);
        clamp_unit(best * (1.0 + 0.1 * (paths as f64 - 1.0)))
    }
}

/// Breadth-first traversal over dependents from `sources`
pub fn propagate(map: &DomainMap, sources: &[String], max_depth: usize) -> Propagation {
    let mut state = Propagation::default();
    let mut frontier: BTreeSet<String> = BTreeSet::new();

    for source in sources {
        if state.depth.insert(source.clone(), 0).is_none() {
            state.best_score.insert(source.clone(), 1.0);
            state.path_count.insert(source.clone(), 1);
            frontier.insert(source.clone());
        }
    }

    let mut depth = 0;
    while !frontier.is_empty() && depth + 1 < max_depth {
        let next_depth = depth + 1;
        let mut next: BTreeSet<String> = BTreeSet::new();

        for current in &frontier {
            let current_score = state.best_score.get(current).copied().unwrap_or(0.0);
            let current_paths = state.path_count.get(current).copied().unwrap_or(1);

            for rel in map.dependents_of(current) {
                let reached = &rel.source;
                let score = current_score * rel.strength;
                match state.depth.get(reached).copied() {
                    None => {
                        state.depth.insert(reached.clone(), next_depth);
                        state.best_score.insert(reached.clone(), score);
                        state.path_count.insert(reached.clone(), current_paths);
                        state
                            .parents
                            .insert(reached.clone(), vec![(current.clone(), rel.strength)]);
                        next.insert(reached.clone());
                    }
                    Some(d) if d == next_depth => {
                        let best = state.best_score.entry(reached.clone()).or_insert(0.0);
                        if score > *best {
                            *best = score;
                        }
                        let count = state.path_count.entry(reached.clone()).or_insert(0);
                        *count = count.saturating_add(current_paths);
                        state
                            .parents
                            .entry(reached.clone())
                            .or_default()
                            .push((current.clone(), rel.strength));
                    }
                    // Already reached at the same or a shallower depth
                    Some(_) => {}
                }
            }
        }

        frontier = next;
        depth = next_depth;
    }

    state
}

fn build_graph(
    map: &DomainMap,
    propagation: &Propagation,
    changed_counts: &BTreeMap<String, usize>,
) -> ImpactGraph {
    let mut nodes = BTreeMap::new();
    for (domain, &depth) in &propagation.depth {
        let changed = changed_counts.get(domain).copied().unwrap_or(0);
        let score = if depth == 0 {
            1.0
        } else {
            propagation.impact_score(domain)
        };
        nodes.insert(
            domain.clone(),
            ImpactNode {
                domain: domain.clone(),
                impact_level: ImpactLevel::for_depth(depth),
                impact_score: score,
                update_priority: update_priority(depth, score, changed),
                estimated_update_time_ms: estimate_update_time_ms(depth, score, changed),
                changed_file_count: changed,
                propagation_depth: depth,
                path_count: propagation.path_count.get(domain).copied().unwrap_or(1),
            },
        );
    }

    let edges = map
        .relationships
        .iter()
        .filter(|r| r.source != r.target)
        .filter(|r| nodes.contains_key(&r.source) && nodes.contains_key(&r.target))
        .map(|r| ImpactEdge {
            source: r.source.clone(),
            target: r.target.clone(),
            relationship_type: r.relationship_type,
            strength: r.strength,
        })
        .collect();

    ImpactGraph { nodes, edges }
}

/// Topological order of affected domains: dependencies first, ready domains by
/// highest impact score then name. Cycles yield the highest-score domain.
pub fn update_sequence(map: &DomainMap, graph: &ImpactGraph) -> Vec<String> {
    let mut unresolved: BTreeMap<String, BTreeSet<String>> = graph
        .nodes
        .keys()
        .map(|d| {
            let deps: BTreeSet<String> = map
                .dependencies_of(d)
                .filter(|r| graph.nodes.contains_key(&r.target))
                .map(|r| r.target.clone())
                .collect();
            (d.clone(), deps)
        })
        .collect();

    let score = |d: &str| graph.nodes.get(d).map(|n| n.impact_score).unwrap_or(0.0);
    let pick_best = |candidates: Vec<&String>| -> Option<String> {
        candidates
            .into_iter()
            .max_by(|a, b| {
                score(a)
                    .partial_cmp(&score(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.cmp(a))
            })
            .cloned()
    };

    let mut sequence = Vec::with_capacity(unresolved.len());
    while !unresolved.is_empty() {
        let ready: Vec<&String> = unresolved
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(d, _)| d)
            .collect();
        let chosen = if ready.is_empty() {
            pick_best(unresolved.keys().collect())
        } else {
            pick_best(ready)
        };
        let Some(chosen) = chosen else { break };

        unresolved.remove(&chosen);
        for deps in unresolved.values_mut() {
            deps.remove(&chosen);
        }
        sequence.push(chosen);
    }
    sequence
}

/// Resolve a changed file to an absolute path under `project_root`
pub fn absolute_path(project_root: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        project_root.join(file)
    }
}

/// Changed-file counts per owning domain
pub fn changed_files_by_domain(project_root: &Path, changed_files: &[PathBuf]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for file in changed_files {
        let location = location_for_path(&absolute_path(project_root, file), project_root);
        *counts.entry(location.domain).or_insert(0) += 1;
    }
    counts
}

/// Predict how far a change set propagates through the domain map
pub fn predict_change_impact(
    map: &DomainMap,
    changed_files: &[PathBuf],
    config: &ImpactConfig,
) -> ImpactPrediction {
    let changed_counts = changed_files_by_domain(&map.project_root, changed_files);
    let sources: Vec<String> = changed_counts.keys().cloned().collect();

    let propagation = propagate(map, &sources, config.max_propagation_depth);
    let impact_graph = build_graph(map, &propagation, &changed_counts);
    let risk_factors = assess_risks(map, &impact_graph, config);
    let recommendations = recommendations_for(&risk_factors);
    let update_sequence = update_sequence(map, &impact_graph);

    let confidence_score = if impact_graph.nodes.is_empty() {
        0.0
    } else {
        let total: f64 = impact_graph
            .nodes
            .keys()
            .map(|d| map.domain(d).map(|dom| dom.confidence).unwrap_or(0.0))
            .sum();
        clamp_unit(total / impact_graph.nodes.len() as f64)
    };

    tracing::debug!(
        "Impact of {} changed file(s): {} domain(s) affected",
        changed_files.len(),
        impact_graph.nodes.len()
    );

    ImpactPrediction {
        impact_graph,
        risk_factors,
        recommendations,
        update_sequence,
        confidence_score,
    }
}

/// Rebuild shortest propagation paths to `target` from parent pointers
fn paths_to(propagation: &Propagation, target: &str) -> Vec<PropagationPath> {
    let mut complete = Vec::new();
    // (domain at the head of the partial path, path target-first, strength)
    let mut stack: Vec<(String, Vec<String>, f64)> =
        vec![(target.to_string(), vec![target.to_string()], 1.0)];

    while let Some((head, partial, strength)) = stack.pop() {
        if complete.len() >= MAX_PATHS_PER_DOMAIN {
            break;
        }
        match propagation.parents.get(&head) {
            Some(parents) if !parents.is_empty() => {
                for (parent, edge_strength) in parents.iter().rev() {
                    let mut extended = partial.clone();
                    extended.push(parent.clone());
                    stack.push((parent.clone(), extended, strength * edge_strength));
                }
            }
            _ => {
                let mut domains = partial;
                domains.reverse();
                complete.push(PropagationPath {
                    source: domains[0].clone(),
                    target: target.to_string(),
                    depth: domains.len() - 1,
                    domains,
                    strength: clamp_unit(strength),
                });
            }
        }
    }
    complete
}

/// Impact of the given source domains on the rest of the map
pub fn analyze_specific_domains_impact(
    map: &DomainMap,
    source_domains: &[String],
    target_domains: Option<&[String]>,
    include_transitive: bool,
    max_depth: Option<usize>,
    config: &ImpactConfig,
) -> Result<SpecificDomainsImpact> {
    let unknown: Vec<&String> = source_domains
        .iter()
        .filter(|d| !map.domains.contains_key(*d))
        .collect();
    if !unknown.is_empty() {
        return Err(GatewayError::validation(format!(
            "unknown source domain(s): {}",
            unknown
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    let depth_limit = if include_transitive {
        max_depth.unwrap_or(config.max_propagation_depth)
    } else {
        NON_TRANSITIVE_DEPTH.min(max_depth.unwrap_or(NON_TRANSITIVE_DEPTH))
    }
    .max(1);

    let propagation = propagate(map, source_domains, depth_limit);
    let mut impact_graph = build_graph(map, &propagation, &BTreeMap::new());

    let mut propagation_paths: Vec<PropagationPath> = impact_graph
        .nodes
        .values()
        .filter(|n| n.propagation_depth > 0)
        .flat_map(|n| paths_to(&propagation, &n.domain))
        .collect();

    if let Some(targets) = target_domains {
        let wanted: BTreeSet<&str> = targets.iter().map(String::as_str).collect();
        impact_graph.nodes.retain(|d, _| wanted.contains(d.as_str()));
        impact_graph
            .edges
            .retain(|e| wanted.contains(e.source.as_str()) || wanted.contains(e.target.as_str()));
        propagation_paths.retain(|p| wanted.contains(p.target.as_str()));
    }

    Ok(SpecificDomainsImpact {
        source_domains: source_domains.to_vec(),
        target_domains: target_domains.map(|t| t.to_vec()),
        impact_graph,
        propagation_paths,
        max_depth_used: depth_limit,
    })
}
