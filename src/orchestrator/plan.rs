//! Per-context update plans

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analyzer::AnalysisResult;

/// Where a context sits in the domain hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlanKind {
    Standard,
    Parent { children: Vec<String> },
    Child { parent: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedFile {
    pub path: PathBuf,
    pub content: String,
}

/// Everything needed to regenerate one context document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainUpdatePlan {
    /// `Domain` or `Domain.Sub`
    pub domain: String,
    pub kind: PlanKind,
    pub context_path: PathBuf,
    /// Filled during content generation
    pub files: Vec<PlannedFile>,
    /// Plans whose analysis references concepts defined here
    pub dependent_domains: Vec<String>,
    pub update_reason: String,
    #[serde(skip)]
    pub sources: Vec<AnalysisResult>,
}

impl DomainUpdatePlan {
    pub fn new(
        domain: impl Into<String>,
        kind: PlanKind,
        context_path: PathBuf,
        sources: Vec<AnalysisResult>,
        update_reason: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            kind,
            context_path,
            files: Vec::new(),
            dependent_domains: Vec::new(),
            update_reason: update_reason.into(),
            sources,
        }
    }

    pub fn parent(&self) -> Option<&str> {
        match &self.kind {
            PlanKind::Child { parent } => Some(parent),
            _ => None,
        }
    }

    fn defined_names(&self) -> BTreeSet<&str> {
        self.sources
            .iter()
            .flat_map(|r| r.business_concepts.iter().chain(r.key_interfaces.iter()))
            .map(String::as_str)
            .collect()
    }

    fn referenced_names(&self) -> BTreeSet<&str> {
        self.sources
            .iter()
            .flat_map(|r| r.references.iter())
            .map(String::as_str)
            .collect()
    }
}

/// `<context_dir>/<Domain>/CONTEXT.md` or `<context_dir>/<Domain>/<Sub>/CONTEXT.md`
pub fn context_path(context_dir: &Path, domain: &str, sub_domain: Option<&str>) -> PathBuf {
    let mut path = context_dir.join(domain);
    if let Some(sub) = sub_domain {
        path.push(sub);
    }
    path.join("CONTEXT.md")
}

/// Fill `dependent_domains` and order plans: parents before their children,
/// then referenced plans before the plans referencing them. Cycles are broken
/// by name.
pub fn sort_plans(mut plans: Vec<DomainUpdatePlan>) -> Vec<DomainUpdatePlan> {
    let names: Vec<String> = plans.iter().map(|p| p.domain.clone()).collect();

    // prerequisites[plan] = plans that must come first
    let mut prerequisites: BTreeMap<String, BTreeSet<String>> =
        names.iter().map(|n| (n.clone(), BTreeSet::new())).collect();
    let mut dependents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for plan in &plans {
        if let Some(parent) = plan.parent() {
            if names.iter().any(|n| n == parent) {
                if let Some(set) = prerequisites.get_mut(&plan.domain) {
                    set.insert(parent.to_string());
                }
            }
        }
        let referenced = plan.referenced_names();
        for other in &plans {
            if other.domain == plan.domain {
                continue;
            }
            if other.defined_names().iter().any(|n| referenced.contains(n)) {
                if let Some(set) = prerequisites.get_mut(&plan.domain) {
                    set.insert(other.domain.clone());
                }
                dependents
                    .entry(other.domain.clone())
                    .or_default()
                    .insert(plan.domain.clone());
            }
        }
    }

    for plan in &mut plans {
        plan.dependent_domains = dependents
            .remove(&plan.domain)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
    }

    let mut order: Vec<String> = Vec::with_capacity(plans.len());
    while !prerequisites.is_empty() {
        let next = prerequisites
            .iter()
            .find(|(_, deps)| deps.is_empty())
            .map(|(name, _)| name.clone())
            .or_else(|| {
                // Cycle: a parent still goes before its own children
                prerequisites
                    .iter()
                    .find(|(name, deps)| {
                        !deps.iter().any(|d| {
                            plans
                                .iter()
                                .any(|p| &p.domain == *name && p.parent() == Some(d.as_str()))
                        })
                    })
                    .or_else(|| prerequisites.iter().next())
                    .map(|(name, _)| name.clone())
            });
        let Some(next) = next else { break };
        prerequisites.remove(&next);
        for deps in prerequisites.values_mut() {
            deps.remove(&next);
        }
        order.push(next);
    }

    let mut by_name: BTreeMap<String, DomainUpdatePlan> =
        plans.into_iter().map(|p| (p.domain.clone(), p)).collect();
    order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(concepts: &[&str], references: &[&str]) -> AnalysisResult {
        AnalysisResult {
            file_path: PathBuf::from("/repo/x.cs"),
            domain_context: String::new(),
            business_concepts: concepts.iter().map(|s| s.to_string()).collect(),
            business_rules: Vec::new(),
            language: "csharp".to_string(),
            analysis_time_ms: 0.0,
            key_interfaces: Vec::new(),
            references: references.iter().map(|s| s.to_string()).collect(),
            complexity: 0,
        }
    }

    fn plan(name: &str, kind: PlanKind, sources: Vec<AnalysisResult>) -> DomainUpdatePlan {
        DomainUpdatePlan::new(name, kind, PathBuf::from(name), sources, "test")
    }

    #[test]
    fn test_context_path() {
        let dir = Path::new("/repo/.context");
        assert_eq!(
            context_path(dir, "Analysis", Some("Fractal")),
            PathBuf::from("/repo/.context/Analysis/Fractal/CONTEXT.md")
        );
        assert_eq!(
            context_path(dir, "Billing", None),
            PathBuf::from("/repo/.context/Billing/CONTEXT.md")
        );
    }

    #[test]
    fn test_parents_before_children_and_references() {
        let plans = vec![
            plan(
                "Analysis.Fractal",
                PlanKind::Child {
                    parent: "Analysis".to_string(),
                },
                vec![source(&["FractalSeries"], &["Invoice"])],
            ),
            plan("Orders", PlanKind::Standard, vec![source(&["Order"], &["Invoice"])]),
            plan("Billing", PlanKind::Standard, vec![source(&["Invoice"], &[])]),
            plan(
                "Analysis",
                PlanKind::Parent {
                    children: vec!["Fractal".to_string()],
                },
                vec![source(&["Report"], &[])],
            ),
        ];

        let sorted = sort_plans(plans);
        let order: Vec<&str> = sorted.iter().map(|p| p.domain.as_str()).collect();
        let pos = |n: &str| order.iter().position(|o| *o == n).unwrap();

        assert!(pos("Analysis") < pos("Analysis.Fractal"));
        assert!(pos("Billing") < pos("Orders"));
        assert!(pos("Billing") < pos("Analysis.Fractal"));

        let billing = sorted.iter().find(|p| p.domain == "Billing").unwrap();
        assert_eq!(billing.dependent_domains, vec!["Analysis.Fractal", "Orders"]);
    }

    #[test]
    fn test_reference_cycle_still_orders_everything() {
        let plans = vec![
            plan("A", PlanKind::Standard, vec![source(&["Alpha"], &["Beta"])]),
            plan("B", PlanKind::Standard, vec![source(&["Beta"], &["Alpha"])]),
        ];
        assert_eq!(sort_plans(plans).len(), 2);
    }
}
