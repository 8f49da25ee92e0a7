//! Domain map and impact graph types

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Clamp into [0, 1]; NaN becomes 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Severity of a risk, priority of an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

pub type UpdatePriority = RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipType {
    Uses,
    DependsOn,
    CrossCutting,
}

/// A logical subsystem of the project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub name: String,
    pub root_path: PathBuf,
    pub sub_domains: BTreeSet<String>,
    pub business_concepts: BTreeSet<String>,
    pub key_interfaces: BTreeSet<String>,
    /// Always within [0, 1]
    pub confidence: f64,
    /// Domains this one depends on (targets of its outgoing relationships)
    pub dependencies: Vec<String>,
    /// Project-relative source files
    pub source_files: Vec<String>,
    pub has_tests: bool,
}

impl Domain {
    pub fn new(name: impl Into<String>, root_path: PathBuf) -> Self {
        Self {
            name: name.into(),
            root_path,
            sub_domains: BTreeSet::new(),
            business_concepts: BTreeSet::new(),
            key_interfaces: BTreeSet::new(),
            confidence: 0.0,
            dependencies: Vec::new(),
            source_files: Vec::new(),
            has_tests: false,
        }
    }
}

/// Directed edge: `source` relies on `target`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRelationship {
    pub source: String,
    pub target: String,
    pub relationship_type: RelationshipType,
    /// Always within [0, 1]; evidence is non-empty whenever this is > 0
    pub strength: f64,
    pub evidence: Vec<String>,
    pub justification: String,
}

impl DomainRelationship {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relationship_type: RelationshipType,
        strength: f64,
        evidence: Vec<String>,
        justification: impl Into<String>,
    ) -> Self {
        // No evidence, no strength
        let strength = if evidence.is_empty() {
            0.0
        } else {
            clamp_unit(strength)
        };
        Self {
            source: source.into(),
            target: target.into(),
            relationship_type,
            strength,
            evidence,
            justification: justification.into(),
        }
    }
}

/// All domains and relationships for one analysis pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainMap {
    pub domains: BTreeMap<String, Domain>,
    pub relationships: Vec<DomainRelationship>,
    pub isolated_domains: Vec<String>,
    pub cross_cutting_concerns: Vec<String>,
    pub project_root: PathBuf,
    pub generated_at: DateTime<Utc>,
}

impl DomainMap {
    pub fn domain(&self, name: &str) -> Option<&Domain> {
        self.domains.get(name)
    }

    /// Relationships whose target is `name` (domains affected when `name` changes)
    pub fn dependents_of<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a DomainRelationship> + 'a {
        self.relationships
            .iter()
            .filter(move |r| r.target == name && r.source != name)
    }

    /// Relationships whose source is `name`
    pub fn dependencies_of<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a DomainRelationship> + 'a {
        self.relationships
            .iter()
            .filter(move |r| r.source == name && r.target != name)
    }

    /// Mermaid flowchart of domains and relationships
    pub fn to_mermaid(&self) -> String {
        let id = |name: &str| -> String {
            name.chars()
                .map(|c| if c.is_alphanumeric() { c } else { '_' })
                .collect()
        };

        let mut out = String::from("graph LR\n");
        for domain in self.domains.values() {
            let _ = writeln!(
                out,
                "    {}[\"{} ({:.2})\"]",
                id(&domain.name),
                domain.name,
                domain.confidence
            );
        }
        for rel in &self.relationships {
            let arrow = match rel.relationship_type {
                RelationshipType::Uses => "-->",
                RelationshipType::DependsOn => "==>",
                RelationshipType::CrossCutting => "-.->",
            };
            let _ = writeln!(
                out,
                "    {} {}|{:.2}| {}",
                id(&rel.source),
                arrow,
                rel.strength,
                id(&rel.target)
            );
        }
        out
    }
}

/// How a domain was reached from the changed files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Direct,
    Indirect,
    Cascade,
}

impl ImpactLevel {
    pub fn for_depth(depth: usize) -> Self {
        match depth {
            0 => Self::Direct,
            1 => Self::Indirect,
            _ => Self::Cascade,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactNode {
    pub domain: String,
    pub impact_level: ImpactLevel,
    /// Always within [0, 1]
    pub impact_score: f64,
    pub update_priority: UpdatePriority,
    pub estimated_update_time_ms: u64,
    pub changed_file_count: usize,
    pub propagation_depth: usize,
    /// Distinct shortest paths from the changed domains
    pub path_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactEdge {
    pub source: String,
    pub target: String,
    pub relationship_type: RelationshipType,
    pub strength: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactGraph {
    pub nodes: BTreeMap<String, ImpactNode>,
    pub edges: Vec<ImpactEdge>,
}

impl ImpactGraph {
    pub fn direct_domains(&self) -> Vec<String> {
        self.nodes
            .values()
            .filter(|n| n.impact_level == ImpactLevel::Direct)
            .map(|n| n.domain.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactor {
    pub category: String,
    pub severity: RiskLevel,
    pub description: String,
    pub mitigation: String,
    pub affected_domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactPrediction {
    pub impact_graph: ImpactGraph,
    pub risk_factors: Vec<RiskFactor>,
    pub recommendations: Vec<String>,
    pub update_sequence: Vec<String>,
    pub confidence_score: f64,
}

/// One shortest route a change travels from a source domain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationPath {
    pub source: String,
    pub target: String,
    /// Source first, target last
    pub domains: Vec<String>,
    /// Product of edge strengths along the path
    pub strength: f64,
    pub depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificDomainsImpact {
    pub source_domains: Vec<String>,
    pub target_domains: Option<Vec<String>>,
    pub impact_graph: ImpactGraph,
    pub propagation_paths: Vec<PropagationPath>,
    pub max_depth_used: usize,
}
