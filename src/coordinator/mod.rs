//! Cross-domain update coordination
//!
//! Turns a change set into a phased plan over every impacted domain, runs
//! each phase through the update orchestrator, and unwinds completed domains
//! when a later phase fails.

pub mod plan;

pub use plan::{
    build_plan, CoordinationEntry, CoordinationPhase, CoordinationPlan, CoordinationStrategy,
    EntryStatus, PlanStatus, RiskAssessment, RollbackStrategy,
};

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::approval::{wait_for_decision, ApprovalCriteria, ApprovalStatus, ApprovalWorkflow};
use crate::config::{CoordinationConfig, GatewayConfig, ImpactConfig};
use crate::domain::impact::absolute_path;
use crate::domain::model::{DomainMap, ImpactLevel, RiskLevel};
use crate::domain::naming::location_for_path;
use crate::domain::{predict_change_impact, DomainGraphBuilder};
use crate::error::{GatewayError, Result};
use crate::orchestrator::{HolisticUpdateRequest, TriggerType, UpdateOrchestrator};

const APPROVAL_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationRequest {
    pub changed_files: Vec<PathBuf>,
    pub trigger_type: TriggerType,
    /// Per-domain update budget; the configured default when absent
    #[serde(default)]
    pub performance_timeout_ms: Option<u64>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub git_commit_hash: Option<String>,
}

impl CoordinationRequest {
    pub fn new(changed_files: Vec<PathBuf>, trigger_type: TriggerType) -> Self {
        Self {
            changed_files,
            trigger_type,
            performance_timeout_ms: None,
            dry_run: false,
            git_commit_hash: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationMetrics {
    pub analysis_time_ms: f64,
    pub planning_time_ms: f64,
    pub execution_time_ms: f64,
    pub rollback_time_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationResult {
    pub success: bool,
    pub plan_id: Option<String>,
    pub dry_run: bool,
    pub executed_phases: usize,
    pub total_phases: usize,
    pub execution_time_ms: f64,
    pub updated_domains: Vec<String>,
    pub failed_domains: Vec<String>,
    pub rolled_back_domains: Vec<String>,
    pub rollback_required: bool,
    pub rollback_completed: bool,
    pub performance_metrics: CoordinationMetrics,
    pub coordination_logs: Vec<String>,
    pub update_sequence: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<CoordinationPlan>,
    pub error: Option<String>,
    pub error_category: Option<String>,
}

impl CoordinationResult {
    fn new(dry_run: bool) -> Self {
        Self {
            success: false,
            plan_id: None,
            dry_run,
            executed_phases: 0,
            total_phases: 0,
            execution_time_ms: 0.0,
            updated_domains: Vec::new(),
            failed_domains: Vec::new(),
            rolled_back_domains: Vec::new(),
            rollback_required: false,
            rollback_completed: false,
            performance_metrics: CoordinationMetrics::default(),
            coordination_logs: Vec::new(),
            update_sequence: Vec::new(),
            plan: None,
            error: None,
            error_category: None,
        }
    }

    fn log(&mut self, message: String) {
        tracing::info!("{}", message);
        self.coordination_logs.push(message);
    }
}

/// A domain whose update committed during this coordination
#[derive(Debug, Clone)]
struct ExecutedDomain {
    domain: String,
    update_id: String,
    snapshot_created: bool,
}

pub struct CrossDomainCoordinator {
    builder: DomainGraphBuilder,
    orchestrator: Arc<UpdateOrchestrator>,
    approval: Arc<dyn ApprovalWorkflow>,
    impact: ImpactConfig,
    coordination: CoordinationConfig,
    default_timeout_ms: u64,
    approval_timeout: Duration,
    rollback_timeout_ms: u64,
    plans: Mutex<BTreeMap<String, CoordinationPlan>>,
}

impl CrossDomainCoordinator {
    pub fn new(
        config: &GatewayConfig,
        builder: DomainGraphBuilder,
        orchestrator: Arc<UpdateOrchestrator>,
        approval: Arc<dyn ApprovalWorkflow>,
    ) -> Self {
        Self {
            builder,
            orchestrator,
            approval,
            impact: config.impact.clone(),
            coordination: config.coordination.clone(),
            default_timeout_ms: config.timeouts.performance_timeout_ms,
            approval_timeout: Duration::from_millis(config.timeouts.approval_timeout_ms),
            rollback_timeout_ms: config.timeouts.rollback_timeout_ms,
            plans: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn builder(&self) -> &DomainGraphBuilder {
        &self.builder
    }

    pub fn orchestrator(&self) -> &Arc<UpdateOrchestrator> {
        &self.orchestrator
    }

    pub fn get_coordination_plan(&self, plan_id: &str) -> Option<CoordinationPlan> {
        self.plans.lock().get(plan_id).cloned()
    }

    /// Plans that are planned or executing
    pub fn get_active_coordinations(&self) -> Vec<CoordinationPlan> {
        self.plans
            .lock()
            .values()
            .filter(|p| p.status.is_active())
            .cloned()
            .collect()
    }

    pub fn plan_count(&self) -> usize {
        self.plans.lock().len()
    }

    fn publish(&self, plan: &CoordinationPlan) {
        let mut plans = self.plans.lock();
        plans.insert(plan.id.clone(), plan.clone());
        let evicted = plan::evict_finished(&mut plans, self.coordination.max_retained_plans);
        if evicted > 0 {
            tracing::debug!("Evicted {} finished coordination plan(s)", evicted);
        }
    }

    /// Plan and (unless `dry_run`) execute an update across every impacted domain
    pub async fn coordinate_update(&self, request: CoordinationRequest) -> CoordinationResult {
        let started = Instant::now();
        let mut result = CoordinationResult::new(request.dry_run);

        match self.run(request, &mut result).await {
            Ok(()) => result.success = true,
            Err(e) => {
                tracing::warn!("Coordination failed: {}", e);
                result.error_category = Some(e.category().to_string());
                result.error = Some(e.to_string());
            }
        }
        result.execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        result
    }

    async fn run(&self, request: CoordinationRequest, result: &mut CoordinationResult) -> Result<()> {
        if request.changed_files.is_empty() {
            return Err(GatewayError::validation("changed file list is empty"));
        }
        let timeout_ms = request.performance_timeout_ms.unwrap_or(self.default_timeout_ms);

        let analysis_started = Instant::now();
        let map = self
            .builder
            .analyze_domain_map(Some(request.changed_files.as_slice()))
            .await?;
        result.performance_metrics.analysis_time_ms =
            analysis_started.elapsed().as_secs_f64() * 1000.0;

        let planning_started = Instant::now();
        let prediction = predict_change_impact(&map, &request.changed_files, &self.impact);
        let mut plan = build_plan(
            &map,
            &prediction,
            request.changed_files.clone(),
            request.trigger_type,
            &self.coordination,
            self.rollback_timeout_ms,
        );
        result.performance_metrics.planning_time_ms =
            planning_started.elapsed().as_secs_f64() * 1000.0;

        result.plan_id = Some(plan.id.clone());
        result.total_phases = plan.phases.len();
        result.update_sequence = plan.update_sequence.clone();
        result.log(format!(
            "Plan {}: {} domain(s) in {} phase(s), overall risk {}",
            plan.id,
            plan.entries.len(),
            plan.phases.len(),
            plan.risk_assessment.overall_risk.as_str()
        ));

        if request.dry_run {
            plan.status = PlanStatus::DryRun;
            self.publish(&plan);
            result.plan = Some(plan);
            return Ok(());
        }

        plan.status = PlanStatus::Executing;
        self.publish(&plan);

        let execution_started = Instant::now();
        let mut executed: Vec<ExecutedDomain> = Vec::new();
        let outcome = self
            .execute_phases(&map, &mut plan, &request, timeout_ms, &mut executed, result)
            .await;
        result.performance_metrics.execution_time_ms =
            execution_started.elapsed().as_secs_f64() * 1000.0;

        let Err(failure) = outcome else {
            plan.status = PlanStatus::Completed;
            self.publish(&plan);
            result.log(format!("Plan {} completed", plan.id));
            return Ok(());
        };

        // Everything not yet run is failed
        for entry in plan.entries.iter_mut() {
            if entry.status == EntryStatus::Pending || entry.status == EntryStatus::Running {
                entry.status = EntryStatus::Failed;
                entry.errors.push(format!("not executed: {}", failure));
                if !result.failed_domains.contains(&entry.domain) {
                    result.failed_domains.push(entry.domain.clone());
                }
            }
        }
        result.rollback_required = true;

        let rollback_started = Instant::now();
        let rollback_budget = Duration::from_millis(plan.rollback_strategy.rollback_timeout_ms);
        let completed =
            match tokio::time::timeout(rollback_budget, self.roll_back(&mut plan, &executed, result))
                .await
            {
                Ok(completed) => completed,
                Err(_) => {
                    result.log(format!(
                        "Rollback of plan {} exceeded {}ms",
                        plan.id,
                        rollback_budget.as_millis()
                    ));
                    false
                }
            };
        result.rollback_completed = completed;
        result.performance_metrics.rollback_time_ms =
            rollback_started.elapsed().as_secs_f64() * 1000.0;

        plan.status = if result.rollback_completed {
            PlanStatus::RolledBack
        } else {
            PlanStatus::Failed
        };
        self.publish(&plan);
        Err(failure)
    }

    async fn execute_phases(
        &self,
        map: &DomainMap,
        plan: &mut CoordinationPlan,
        request: &CoordinationRequest,
        timeout_ms: u64,
        executed: &mut Vec<ExecutedDomain>,
        result: &mut CoordinationResult,
    ) -> Result<()> {
        let phases = plan.phases.clone();
        for phase in &phases {
            if phase.requires_approval {
                self.await_approval(plan, phase).await?;
                result.log(format!("Phase {} approved", phase.number));
            }

            for domain in &phase.domains {
                if let Some(entry) = plan.entry_mut(domain) {
                    entry.status = EntryStatus::Running;
                }
            }
            self.publish(plan);

            let updates = phase.domains.iter().map(|domain| {
                let impact_level = plan
                    .entry(domain)
                    .map(|e| e.impact_level)
                    .unwrap_or(ImpactLevel::Direct);
                let files = self.files_for(map, domain, impact_level, &request.changed_files);
                let mut update =
                    HolisticUpdateRequest::new(files, request.trigger_type, timeout_ms);
                update.git_commit_hash = request.git_commit_hash.clone();
                update.restrict_to_domains = Some(vec![domain.clone()]);
                self.orchestrator.execute_holistic_update(update)
            });
            let outcomes = join_all(updates).await;

            let mut failed = Vec::new();
            for (domain, outcome) in phase.domains.iter().zip(outcomes) {
                let Some(entry) = plan.entry_mut(domain) else {
                    continue;
                };
                entry.update_id = Some(outcome.update_id.clone());
                if outcome.success {
                    entry.status = EntryStatus::Completed;
                    executed.push(ExecutedDomain {
                        domain: domain.clone(),
                        update_id: outcome.update_id,
                        snapshot_created: outcome.snapshot_created,
                    });
                    result.updated_domains.push(domain.clone());
                } else {
                    let message = outcome
                        .error
                        .unwrap_or_else(|| "update failed".to_string());
                    entry.status = EntryStatus::Failed;
                    entry.errors.push(message.clone());
                    result.failed_domains.push(domain.clone());
                    result.log(format!("Domain {} failed: {}", domain, message));
                    failed.push(domain.clone());
                }
            }
            result.executed_phases += 1;
            self.publish(plan);

            if !failed.is_empty() {
                return Err(GatewayError::Coordination {
                    message: format!("phase {} failed for {}", phase.number, failed.join(", ")),
                });
            }
            result.log(format!(
                "Phase {} done: {}",
                phase.number,
                phase.domains.join(", ")
            ));
        }
        Ok(())
    }

    /// Files that regenerate `domain`: the changed files that land in it,
    /// then its own sources up to the refresh cap
    fn files_for(
        &self,
        map: &DomainMap,
        domain: &str,
        impact_level: ImpactLevel,
        changed_files: &[PathBuf],
    ) -> Vec<PathBuf> {
        let root = &map.project_root;
        let mut files: Vec<PathBuf> = Vec::new();
        if impact_level == ImpactLevel::Direct {
            files.extend(
                changed_files
                    .iter()
                    .map(|f| absolute_path(root, f))
                    .filter(|f| location_for_path(f, root).domain == domain),
            );
        }
        let cap = self.coordination.max_refresh_files_per_domain.max(files.len());
        if let Some(d) = map.domain(domain) {
            for source in &d.source_files {
                if files.len() >= cap {
                    break;
                }
                let path = root.join(source);
                if !files.contains(&path) {
                    files.push(path);
                }
            }
        }
        files
    }

    async fn await_approval(&self, plan: &CoordinationPlan, phase: &CoordinationPhase) -> Result<()> {
        let risk_level = phase
            .domains
            .iter()
            .filter_map(|d| plan.entry(d).map(|e| e.risk_level))
            .max()
            .unwrap_or(RiskLevel::Low);
        let criteria = ApprovalCriteria {
            plan_id: plan.id.clone(),
            phase: phase.number,
            risk_level,
            domains: phase.domains.clone(),
            estimated_time_ms: phase.estimated_time_ms,
        };
        let description = format!(
            "Phase {} of {} updates {} ({} risk)",
            phase.number,
            plan.id,
            phase.domains.join(", "),
            risk_level.as_str()
        );

        let approval_id = self.approval.request_approval(&description, &criteria).await?;
        match wait_for_decision(
            self.approval.as_ref(),
            &approval_id,
            self.approval_timeout,
            APPROVAL_POLL_INTERVAL,
        )
        .await?
        {
            ApprovalStatus::Approved => Ok(()),
            status => Err(GatewayError::Coordination {
                message: format!("phase {} not approved ({:?})", phase.number, status),
            }),
        }
    }

    /// Restore completed domains newest first; atomic groups all or nothing.
    /// Returns whether every completed domain was restored.
    async fn roll_back(
        &self,
        plan: &mut CoordinationPlan,
        executed: &[ExecutedDomain],
        result: &mut CoordinationResult,
    ) -> bool {
        let store = self.orchestrator.rollback_store();
        let mut handled: BTreeSet<String> = BTreeSet::new();
        let mut complete = true;

        for done in executed.iter().rev() {
            if handled.contains(&done.domain) {
                continue;
            }
            let group: Vec<&ExecutedDomain> = match plan.rollback_strategy.group_of(&done.domain) {
                Some(members) => executed
                    .iter()
                    .rev()
                    .filter(|e| members.contains(&e.domain))
                    .collect(),
                None => vec![done],
            };
            for member in &group {
                handled.insert(member.domain.clone());
            }

            let mut restorable = true;
            for member in &group {
                if member.snapshot_created && !store.can_restore(&member.update_id).await {
                    restorable = false;
                }
            }
            if !restorable {
                complete = false;
                let names: Vec<&str> = group.iter().map(|m| m.domain.as_str()).collect();
                let message = format!(
                    "rollback skipped for [{}]: snapshot unavailable",
                    names.join(", ")
                );
                for member in &group {
                    if let Some(entry) = plan.entry_mut(&member.domain) {
                        entry.errors.push(message.clone());
                    }
                }
                result.log(message);
                continue;
            }

            for member in group {
                let restored = if member.snapshot_created {
                    store.restore_snapshot(&member.update_id).await.map(|_| ())
                } else {
                    Ok(())
                };
                match restored {
                    Ok(()) => {
                        if let Some(entry) = plan.entry_mut(&member.domain) {
                            entry.status = EntryStatus::RolledBack;
                        }
                        result.updated_domains.retain(|d| d != &member.domain);
                        result.rolled_back_domains.push(member.domain.clone());
                    }
                    Err(e) => {
                        complete = false;
                        let message = format!("rollback of {} failed: {}", member.domain, e);
                        if let Some(entry) = plan.entry_mut(&member.domain) {
                            entry.errors.push(message.clone());
                        }
                        result.log(message);
                    }
                }
            }
        }
        complete
    }
}
