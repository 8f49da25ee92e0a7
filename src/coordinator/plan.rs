//! Coordination plans: phased, dependency-ordered update schedules

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CoordinationConfig;
use crate::domain::graph::DomainGraph;
use crate::domain::model::{
    DomainMap, ImpactLevel, ImpactPrediction, RiskFactor, RiskLevel,
};
use crate::orchestrator::TriggerType;

/// How a domain is scheduled relative to its phase mates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationStrategy {
    Parallel,
    Sequential,
    Atomic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryStatus {
    Pending,
    Running,
    Completed,
    Failed,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanStatus {
    Planned,
    DryRun,
    Executing,
    Completed,
    Failed,
    RolledBack,
}

impl PlanStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Planned | Self::Executing)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationEntry {
    pub domain: String,
    pub phase: usize,
    pub strategy: CoordinationStrategy,
    pub risk_level: RiskLevel,
    pub impact_level: ImpactLevel,
    pub impact_score: f64,
    pub estimated_time_ms: u64,
    /// In-plan domains this one depends on
    pub dependencies: Vec<String>,
    /// In-plan domains depending on this one
    pub dependents: Vec<String>,
    pub errors: Vec<String>,
    pub status: EntryStatus,
    pub update_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationPhase {
    /// 1-based
    pub number: usize,
    pub domains: Vec<String>,
    /// Dependency cycles scheduled together
    pub atomic_groups: Vec<Vec<String>>,
    pub requires_approval: bool,
    pub estimated_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub overall_risk: RiskLevel,
    pub risk_factors: Vec<RiskFactor>,
    pub recommendations: Vec<String>,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackStrategy {
    /// Planned order: last phase first
    pub rollback_sequence: Vec<String>,
    pub atomic_groups: Vec<Vec<String>>,
    pub rollback_timeout_ms: u64,
}

impl RollbackStrategy {
    /// The atomic group `domain` belongs to, if any
    pub fn group_of(&self, domain: &str) -> Option<&Vec<String>> {
        self.atomic_groups
            .iter()
            .find(|g| g.iter().any(|d| d == domain))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationPlan {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub trigger_type: TriggerType,
    pub changed_files: Vec<PathBuf>,
    pub entries: Vec<CoordinationEntry>,
    pub phases: Vec<CoordinationPhase>,
    pub total_estimated_time_ms: u64,
    pub risk_assessment: RiskAssessment,
    pub rollback_strategy: RollbackStrategy,
    pub status: PlanStatus,
    pub update_sequence: Vec<String>,
}

impl CoordinationPlan {
    pub fn entry(&self, domain: &str) -> Option<&CoordinationEntry> {
        self.entries.iter().find(|e| e.domain == domain)
    }

    pub fn entry_mut(&mut self, domain: &str) -> Option<&mut CoordinationEntry> {
        self.entries.iter_mut().find(|e| e.domain == domain)
    }

    /// Domains in `status`, in plan order
    pub fn domains_with(&self, status: EntryStatus) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.status == status)
            .map(|e| e.domain.clone())
            .collect()
    }
}

/// Generate `coord_<timestamp>_<suffix>`
pub fn generate_plan_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("coord_{}_{}", Utc::now().format("%Y%m%d%H%M%S%3f"), &suffix[..8])
}

/// Entry risk from its impact score, raised by any risk factor naming it
pub fn entry_risk(domain: &str, impact_score: f64, risks: &[RiskFactor]) -> RiskLevel {
    let base = if impact_score >= 0.9 {
        RiskLevel::High
    } else if impact_score >= 0.5 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };
    risks
        .iter()
        .filter(|r| r.affected_domains.iter().any(|d| d == domain))
        .map(|r| r.severity)
        .fold(base, RiskLevel::max)
}

fn phase_requires_approval(levels: &[RiskLevel], config: &CoordinationConfig) -> bool {
    levels.iter().any(|level| {
        *level == RiskLevel::Critical
            || (*level == RiskLevel::High && config.require_approval_for_high_risk)
    })
}

/// Build a coordination plan from an impact prediction
pub fn build_plan(
    map: &DomainMap,
    prediction: &ImpactPrediction,
    changed_files: Vec<PathBuf>,
    trigger_type: TriggerType,
    config: &CoordinationConfig,
    rollback_timeout_ms: u64,
) -> CoordinationPlan {
    let nodes = &prediction.impact_graph.nodes;
    let affected: Vec<String> = nodes.keys().cloned().collect();
    let graph = DomainGraph::for_domains(map, &affected);
    let layers = graph.layered_components();

    let mut entries = Vec::with_capacity(affected.len());
    let mut phases = Vec::with_capacity(layers.len());
    let mut atomic_groups: Vec<Vec<String>> = Vec::new();

    for (i, layer) in layers.iter().enumerate() {
        let number = i + 1;
        let mut domains = Vec::new();
        let mut groups = Vec::new();
        let mut levels = Vec::new();
        let mut phase_time = 0u64;

        for component in layer {
            let atomic = component.len() > 1;
            if atomic {
                groups.push(component.clone());
            }
            for domain in component {
                let Some(node) = nodes.get(domain) else {
                    continue;
                };
                let dependencies = graph.dependencies(domain);
                let strategy = if atomic {
                    CoordinationStrategy::Atomic
                } else if !dependencies.is_empty() {
                    CoordinationStrategy::Sequential
                } else {
                    CoordinationStrategy::Parallel
                };
                let risk_level = entry_risk(domain, node.impact_score, &prediction.risk_factors);
                levels.push(risk_level);
                phase_time = phase_time.max(node.estimated_update_time_ms);
                domains.push(domain.clone());
                entries.push(CoordinationEntry {
                    domain: domain.clone(),
                    phase: number,
                    strategy,
                    risk_level,
                    impact_level: node.impact_level,
                    impact_score: node.impact_score,
                    estimated_time_ms: node.estimated_update_time_ms,
                    dependencies,
                    dependents: graph.dependents(domain),
                    errors: Vec::new(),
                    status: EntryStatus::Pending,
                    update_id: None,
                });
            }
        }

        atomic_groups.extend(groups.iter().cloned());
        phases.push(CoordinationPhase {
            number,
            domains,
            atomic_groups: groups,
            requires_approval: phase_requires_approval(&levels, config),
            estimated_time_ms: phase_time,
        });
    }

    let rollback_sequence: Vec<String> = phases
        .iter()
        .rev()
        .flat_map(|p| p.domains.iter().rev().cloned())
        .collect();

    let overall_risk = entries
        .iter()
        .map(|e| e.risk_level)
        .chain(prediction.risk_factors.iter().map(|r| r.severity))
        .max()
        .unwrap_or(RiskLevel::Low);

    CoordinationPlan {
        id: generate_plan_id(),
        created_at: Utc::now(),
        trigger_type,
        changed_files,
        total_estimated_time_ms: phases.iter().map(|p| p.estimated_time_ms).sum(),
        entries,
        phases,
        risk_assessment: RiskAssessment {
            overall_risk,
            risk_factors: prediction.risk_factors.clone(),
            recommendations: prediction.recommendations.clone(),
            confidence_score: prediction.confidence_score,
        },
        rollback_strategy: RollbackStrategy {
            rollback_sequence,
            atomic_groups,
            rollback_timeout_ms,
        },
        status: PlanStatus::Planned,
        update_sequence: prediction.update_sequence.clone(),
    }
}

/// Evict the oldest finished plans beyond `max_retained`. Active plans stay.
pub fn evict_finished(plans: &mut BTreeMap<String, CoordinationPlan>, max_retained: usize) -> usize {
    if plans.len() <= max_retained {
        return 0;
    }
    let mut finished: Vec<(DateTime<Utc>, String)> = plans
        .values()
        .filter(|p| !p.status.is_active())
        .map(|p| (p.created_at, p.id.clone()))
        .collect();
    finished.sort();

    let excess = plans.len() - max_retained;
    let victims: BTreeSet<String> = finished.into_iter().take(excess).map(|(_, id)| id).collect();
    plans.retain(|id, _| !victims.contains(id));
    victims.len()
}
