//! Structural risk signals for an impact graph

use std::collections::BTreeSet;

use super::graph::DomainGraph;
use super::model::{ImpactGraph, ImpactLevel, RiskFactor, RiskLevel, UpdatePriority};
use super::DomainMap;
use crate::config::ImpactConfig;

/// Priority of updating a domain given how hard it was hit
pub fn update_priority(depth: usize, score: f64, changed_files: usize) -> UpdatePriority {
    if depth == 0 {
        if changed_files >= 10 {
            RiskLevel::Critical
        } else {
            RiskLevel::High
        }
    } else if score >= 0.6 {
        RiskLevel::High
    } else if score >= 0.3 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Rough cost of regenerating one domain's context
pub fn estimate_update_time_ms(depth: usize, score: f64, changed_files: usize) -> u64 {
    let files = changed_files.max(1) as u64;
    500 + 250 * files + (1000.0 * score) as u64 + 100 * depth as u64
}

/// Derive risk factors from the impact graph and the map it came from
pub fn assess_risks(map: &DomainMap, graph: &ImpactGraph, config: &ImpactConfig) -> Vec<RiskFactor> {
    let mut risks = Vec::new();
    let affected: Vec<String> = graph.nodes.keys().cloned().collect();

    let weak_edges: BTreeSet<String> = graph
        .edges
        .iter()
        .filter(|e| e.strength < config.low_confidence_threshold)
        .map(|e| e.source.clone())
        .collect();
    if !weak_edges.is_empty() {
        risks.push(RiskFactor {
            category: "low-confidence-relationship".to_string(),
            severity: RiskLevel::Medium,
            description: format!(
                "{} domain(s) are reached through relationships weaker than {:.2}",
                weak_edges.len(),
                config.low_confidence_threshold
            ),
            mitigation: "Review the generated context of these domains by hand".to_string(),
            affected_domains: weak_edges.into_iter().collect(),
        });
    }

    let weak_domains: Vec<String> = affected
        .iter()
        .filter(|d| {
            map.domain(d)
                .map(|dom| dom.confidence < config.low_confidence_threshold)
                .unwrap_or(true)
        })
        .cloned()
        .collect();
    if !weak_domains.is_empty() {
        risks.push(RiskFactor {
            category: "low-confidence-domain".to_string(),
            severity: RiskLevel::Low,
            description: format!(
                "{} affected domain(s) have little or inconsistent evidence",
                weak_domains.len()
            ),
            mitigation: "Consider adding namespaces or splitting mixed directories".to_string(),
            affected_domains: weak_domains,
        });
    }

    let untested: Vec<String> = affected
        .iter()
        .filter(|d| map.domain(d).map(|dom| !dom.has_tests).unwrap_or(true))
        .cloned()
        .collect();
    if !untested.is_empty() {
        let any_direct = untested.iter().any(|d| {
            graph
                .nodes
                .get(d)
                .map(|n| n.impact_level == ImpactLevel::Direct)
                .unwrap_or(false)
        });
        risks.push(RiskFactor {
            category: "missing-tests".to_string(),
            severity: if any_direct {
                RiskLevel::High
            } else {
                RiskLevel::Medium
            },
            description: format!("{} affected domain(s) have no tests", untested.len()),
            mitigation: "Add tests before relying on regenerated context".to_string(),
            affected_domains: untested,
        });
    }

    let fan_out: Vec<String> = affected
        .iter()
        .filter(|d| map.dependents_of(d).count() > config.fan_out_threshold)
        .cloned()
        .collect();
    if !fan_out.is_empty() {
        risks.push(RiskFactor {
            category: "large-fan-out".to_string(),
            severity: RiskLevel::High,
            description: format!(
                "{} affected domain(s) have more than {} dependents",
                fan_out.len(),
                config.fan_out_threshold
            ),
            mitigation: "Update dependents in separate phases and verify each".to_string(),
            affected_domains: fan_out,
        });
    }

    let cascade: Vec<String> = graph
        .nodes
        .values()
        .filter(|n| n.impact_level == ImpactLevel::Cascade)
        .map(|n| n.domain.clone())
        .collect();
    if !cascade.is_empty() {
        risks.push(RiskFactor {
            category: "cascade-propagation".to_string(),
            severity: if cascade.len() > 3 {
                RiskLevel::High
            } else {
                RiskLevel::Medium
            },
            description: format!(
                "The change cascades into {} domain(s) beyond its direct dependents",
                cascade.len()
            ),
            mitigation: "Run a dry run first and review the update sequence".to_string(),
            affected_domains: cascade,
        });
    }

    for cycle in DomainGraph::for_domains(map, &affected).cycles() {
        risks.push(RiskFactor {
            category: "dependency-cycle".to_string(),
            severity: RiskLevel::High,
            description: format!("Domains {} depend on each other", cycle.join(", ")),
            mitigation: "These domains are updated and rolled back as one atomic group"
                .to_string(),
            affected_domains: cycle,
        });
    }

    if affected.len() > 2 * config.fan_out_threshold.max(1) {
        risks.push(RiskFactor {
            category: "wide-blast-radius".to_string(),
            severity: RiskLevel::Critical,
            description: format!("{} domains are affected by this change", affected.len()),
            mitigation: "Split the change or approve the plan phase by phase".to_string(),
            affected_domains: affected.clone(),
        });
    }

    risks.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.category.cmp(&b.category)));
    risks
}

/// One recommendation per risk category, most severe first
pub fn recommendations_for(risks: &[RiskFactor]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for risk in risks {
        if !seen.insert(risk.category.as_str()) {
            continue;
        }
        let text = match risk.category.as_str() {
            "low-confidence-relationship" => format!(
                "Verify relationships into {} before trusting propagated updates",
                risk.affected_domains.join(", ")
            ),
            "low-confidence-domain" => format!(
                "Improve structure or naming for {} to raise analysis confidence",
                risk.affected_domains.join(", ")
            ),
            "missing-tests" => format!("Add tests for {}", risk.affected_domains.join(", ")),
            "large-fan-out" => format!(
                "Stage updates for high fan-out domains {}",
                risk.affected_domains.join(", ")
            ),
            "cascade-propagation" => {
                "Preview the coordination plan with a dry run before executing".to_string()
            }
            "dependency-cycle" => format!(
                "Consider breaking the dependency cycle between {}",
                risk.affected_domains.join(", ")
            ),
            _ => risk.mitigation.clone(),
        };
        out.push(text);
    }
    out
}
