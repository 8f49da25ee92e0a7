//! Holistic update pipeline
//!
//! One run turns a changed-file set into regenerated context documents:
//!
//! 1. semantic analysis of the changed files
//! 2. domain placement, granular qualification and plan construction
//! 3. content generation and specialization
//! 4. one atomic transaction, followed by a rollback snapshot
//!
//! Each phase runs under its own share of the request's wall-clock budget.
//! Every outcome, including failures, is folded into [`HolisticUpdateResult`].

pub mod granular;
pub mod plan;
pub mod specialization;

pub use granular::{GranularAssessment, GranularQualifier};
pub use plan::{context_path, DomainUpdatePlan, PlanKind, PlannedFile};
pub use specialization::{ChildContent, ConsistencyReport, ContentSpecializer};

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::analyzer::{AnalysisCache, AnalysisResult, SemanticAnalyzer};
use crate::atomic::{AtomicFileManager, FileOperation, OperationKind};
use crate::config::{GatewayConfig, ResolvedPaths};
use crate::domain::naming::{cross_cutting_from_context, location_for_path};
use crate::error::{GatewayError, Result};
use crate::lang::is_analyzable;
use crate::rollback::{CleanupReport, RollbackStore};
use crate::template::{ComplexityLevel, TemplateEngine};

/// What started an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerType {
    GitCommit,
    FileChange,
    Manual,
    Scheduled,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitCommit => "git-commit",
            Self::FileChange => "file-change",
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolisticUpdateRequest {
    pub changed_files: Vec<PathBuf>,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub git_commit_hash: Option<String>,
    pub performance_timeout_ms: u64,
    /// Only regenerate these top-level domains (no cross-cutting fan-out)
    #[serde(default)]
    pub restrict_to_domains: Option<Vec<String>>,
}

impl HolisticUpdateRequest {
    pub fn new(changed_files: Vec<PathBuf>, trigger_type: TriggerType, performance_timeout_ms: u64) -> Self {
        Self {
            changed_files,
            trigger_type,
            git_commit_hash: None,
            performance_timeout_ms,
            restrict_to_domains: None,
        }
    }
}

/// Pipeline phase, each with a fixed share of the time budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdatePhase {
    SemanticAnalysis,
    DomainAnalysis,
    ContentGeneration,
    FileOperations,
}

impl UpdatePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SemanticAnalysis => "semantic-analysis",
            Self::DomainAnalysis => "domain-analysis",
            Self::ContentGeneration => "content-generation",
            Self::FileOperations => "file-operations",
        }
    }

    pub fn budget_share(&self) -> f64 {
        match self {
            Self::SemanticAnalysis => 0.40,
            Self::DomainAnalysis => 0.15,
            Self::ContentGeneration => 0.25,
            Self::FileOperations => 0.20,
        }
    }

    pub fn budget(&self, total_ms: u64) -> Duration {
        Duration::from_secs_f64(total_ms as f64 * self.budget_share() / 1000.0)
    }
}

/// Per-phase wall-clock timings in milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub semantic_analysis_time: f64,
    pub domain_analysis_time: f64,
    pub content_generation_time: f64,
    pub file_operations_time: f64,
    pub total_time: f64,
}

impl PerformanceMetrics {
    fn slot(&mut self, phase: UpdatePhase) -> &mut f64 {
        match phase {
            UpdatePhase::SemanticAnalysis => &mut self.semantic_analysis_time,
            UpdatePhase::DomainAnalysis => &mut self.domain_analysis_time,
            UpdatePhase::ContentGeneration => &mut self.content_generation_time,
            UpdatePhase::FileOperations => &mut self.file_operations_time,
        }
    }
}

/// How the atomic engine (or a post-timeout revert) left the files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
    pub transaction_id: String,
    pub restored: bool,
    pub operations_reverted: usize,
    pub restore_errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolisticUpdateResult {
    pub success: bool,
    pub update_id: String,
    pub trigger_type: TriggerType,
    pub git_commit_hash: Option<String>,
    pub affected_domains: Vec<String>,
    pub updated_context_files: Vec<PathBuf>,
    pub deleted_context_files: Vec<PathBuf>,
    pub granular_contexts_created: Vec<String>,
    pub granular_assessments: Vec<GranularAssessment>,
    pub consistency_reports: Vec<ConsistencyReport>,
    pub transaction_id: Option<String>,
    pub snapshot_created: bool,
    pub performance_metrics: PerformanceMetrics,
    pub error: Option<String>,
    pub error_category: Option<String>,
    pub failed_phase: Option<UpdatePhase>,
    pub rollback: Option<RollbackOutcome>,
}

impl HolisticUpdateResult {
    fn new(update_id: String, request: &HolisticUpdateRequest) -> Self {
        Self {
            success: false,
            update_id,
            trigger_type: request.trigger_type,
            git_commit_hash: request.git_commit_hash.clone(),
            affected_domains: Vec::new(),
            updated_context_files: Vec::new(),
            deleted_context_files: Vec::new(),
            granular_contexts_created: Vec::new(),
            granular_assessments: Vec::new(),
            consistency_reports: Vec::new(),
            transaction_id: None,
            snapshot_created: false,
            performance_metrics: PerformanceMetrics::default(),
            error: None,
            error_category: None,
            failed_phase: None,
            rollback: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub rollback_cleanup: CleanupReport,
    pub transactions_purged: usize,
    pub cache_entries_pruned: usize,
}

/// Generate `upd_<timestamp>_<suffix>`
pub fn generate_update_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("upd_{}_{}", Utc::now().format("%Y%m%d%H%M%S%3f"), &suffix[..8])
}

struct PhaseFailure {
    phase: UpdatePhase,
    error: GatewayError,
    rollback: Option<RollbackOutcome>,
}

impl PhaseFailure {
    fn new(phase: UpdatePhase, error: GatewayError) -> Self {
        Self {
            phase,
            error,
            rollback: None,
        }
    }
}

/// Run `fut` under the phase's budget, recording its duration either way
async fn run_phase<T, F>(
    phase: UpdatePhase,
    total_budget_ms: u64,
    metrics: &mut PerformanceMetrics,
    fut: F,
) -> std::result::Result<T, PhaseFailure>
where
    F: Future<Output = Result<T>>,
{
    let budget = phase.budget(total_budget_ms);
    let started = Instant::now();
    let outcome = tokio::time::timeout(budget, fut).await;
    *metrics.slot(phase) = started.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(PhaseFailure::new(phase, e)),
        Err(_) => Err(PhaseFailure::new(
            phase,
            GatewayError::Timeout {
                phase: phase.as_str().to_string(),
                budget_ms: budget.as_millis() as u64,
            },
        )),
    }
}

/// Analysis results of one top-level domain, split by sub-domain
#[derive(Debug, Default)]
struct DomainGroup {
    own: Vec<AnalysisResult>,
    sub_domains: BTreeMap<String, Vec<AnalysisResult>>,
}

/// Output of the domain-analysis phase
struct PlacementOutcome {
    plans: Vec<DomainUpdatePlan>,
    stale_children: Vec<PathBuf>,
    affected_domains: Vec<String>,
    assessments: Vec<GranularAssessment>,
}

/// Output of the content-generation phase
struct GeneratedContent {
    operations: Vec<FileOperation>,
    consistency: Vec<ConsistencyReport>,
}

pub struct UpdateOrchestrator {
    paths: ResolvedPaths,
    analyzer: Arc<dyn SemanticAnalyzer>,
    templates: Arc<dyn TemplateEngine>,
    atomic: AtomicFileManager,
    rollback: Arc<RollbackStore>,
    analysis_cache: Option<AnalysisCache>,
    qualifier: GranularQualifier,
    transaction_max_age: Duration,
}

impl UpdateOrchestrator {
    pub fn new(
        config: &GatewayConfig,
        paths: ResolvedPaths,
        analyzer: Arc<dyn SemanticAnalyzer>,
        templates: Arc<dyn TemplateEngine>,
        rollback: Arc<RollbackStore>,
    ) -> Self {
        let transaction_max_age = config
            .rollback
            .max_age()
            .to_std()
            .unwrap_or_else(|_| Duration::from_secs(7 * 24 * 3600));
        Self {
            atomic: AtomicFileManager::new(paths.transaction_dir.clone()),
            paths,
            analyzer,
            templates,
            rollback,
            analysis_cache: None,
            qualifier: GranularQualifier::new(config.granular.clone()),
            transaction_max_age,
        }
    }

    /// Prune this cache during maintenance
    pub fn with_analysis_cache(mut self, cache: AnalysisCache) -> Self {
        self.analysis_cache = Some(cache);
        self
    }

    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    pub fn atomic(&self) -> &AtomicFileManager {
        &self.atomic
    }

    pub fn rollback_store(&self) -> &Arc<RollbackStore> {
        &self.rollback
    }

    /// Regenerate the contexts affected by `request.changed_files`
    pub async fn execute_holistic_update(&self, request: HolisticUpdateRequest) -> HolisticUpdateResult {
        let started = Instant::now();
        let mut result = HolisticUpdateResult::new(generate_update_id(), &request);
        tracing::info!(
            "Update {} ({}): {} changed file(s), budget {}ms",
            result.update_id,
            request.trigger_type.as_str(),
            request.changed_files.len(),
            request.performance_timeout_ms
        );

        let mut metrics = PerformanceMetrics::default();
        match self.run_pipeline(&request, &mut result, &mut metrics).await {
            Ok(()) => result.success = true,
            Err(failure) => {
                tracing::warn!(
                    "Update {} failed in {}: {}",
                    result.update_id,
                    failure.phase.as_str(),
                    failure.error
                );
                result.error = Some(failure.error.to_string());
                result.error_category = Some(failure.error.category().to_string());
                result.failed_phase = Some(failure.phase);
                if failure.rollback.is_some() {
                    result.rollback = failure.rollback;
                }
            }
        }
        metrics.total_time = started.elapsed().as_secs_f64() * 1000.0;
        result.performance_metrics = metrics;
        result
    }

    async fn run_pipeline(
        &self,
        request: &HolisticUpdateRequest,
        result: &mut HolisticUpdateResult,
        metrics: &mut PerformanceMetrics,
    ) -> std::result::Result<(), PhaseFailure> {
        if request.changed_files.is_empty() {
            return Err(PhaseFailure::new(
                UpdatePhase::SemanticAnalysis,
                GatewayError::validation("changed file list is empty"),
            ));
        }
        let budget = request.performance_timeout_ms;

        let files = self.analyzable_files(request);
        let analysis = run_phase(UpdatePhase::SemanticAnalysis, budget, metrics, async {
            if files.is_empty() {
                return Ok(Vec::new());
            }
            self.analyzer.analyze(&files).await
        })
        .await?;
        if analysis.is_empty() {
            tracing::info!("Update {}: nothing to analyze", result.update_id);
            return Ok(());
        }

        let placement = run_phase(UpdatePhase::DomainAnalysis, budget, metrics, async {
            Ok(self.place(analysis, request.restrict_to_domains.as_deref()).await)
        })
        .await?;
        let PlacementOutcome {
            plans,
            stale_children,
            affected_domains,
            assessments,
        } = placement;
        result.affected_domains = affected_domains;
        result.granular_assessments = assessments;
        result.granular_contexts_created = plans
            .iter()
            .filter(|p| matches!(p.kind, PlanKind::Child { .. }))
            .map(|p| p.domain.clone())
            .collect();

        let generated = run_phase(UpdatePhase::ContentGeneration, budget, metrics, async {
            self.generate(plans, &stale_children).await
        })
        .await?;
        result.consistency_reports = generated.consistency;

        if generated.operations.is_empty() {
            tracing::info!("Update {}: context already current", result.update_id);
            return Ok(());
        }
        for op in &generated.operations {
            match op.kind {
                OperationKind::Delete => result.deleted_context_files.push(op.target.clone()),
                _ => result.updated_context_files.push(op.target.clone()),
            }
        }

        let update_id = result.update_id.clone();
        self.commit(generated.operations, budget, &update_id, result, metrics)
            .await
    }

    fn analyzable_files(&self, request: &HolisticUpdateRequest) -> Vec<PathBuf> {
        let root = &self.paths.project_root;
        let mut seen = BTreeSet::new();
        request
            .changed_files
            .iter()
            .map(|f| if f.is_absolute() { f.clone() } else { root.join(f) })
            .filter(|f| is_analyzable(f))
            .filter(|f| match &request.restrict_to_domains {
                Some(scope) => scope.contains(&location_for_path(f, root).domain),
                None => true,
            })
            .filter(|f| seen.insert(f.clone()))
            .collect()
    }

    /// Group results by domain, qualify sub-domains, and build sorted plans
    async fn place(&self, analysis: Vec<AnalysisResult>, scope: Option<&[String]>) -> PlacementOutcome {
        let root = &self.paths.project_root;
        let mut groups: BTreeMap<String, DomainGroup> = BTreeMap::new();

        for result in analysis {
            let location = location_for_path(&result.file_path, root);
            if scope.is_none() {
                for concern in cross_cutting_from_context(&result.domain_context) {
                    if concern != location.domain {
                        groups.entry(concern).or_default().own.push(result.clone());
                    }
                }
            }
            let group = groups.entry(location.domain).or_default();
            match location.sub_domain {
                Some(sub) => group.sub_domains.entry(sub).or_default().push(result),
                None => group.own.push(result),
            }
        }

        let mut plans = Vec::new();
        let mut stale_children = Vec::new();
        let mut assessments = Vec::new();
        let affected_domains: Vec<String> = groups.keys().cloned().collect();

        for (domain, group) in groups {
            let mut own = group.own;
            let mut children = Vec::new();
            for (sub, results) in group.sub_domains {
                let assessment = self.qualifier.assess(&sub, &results);
                if assessment.qualifies {
                    children.push((sub, results));
                } else {
                    let existing = context_path(&self.paths.context_dir, &domain, Some(&sub));
                    if tokio::fs::metadata(&existing)
                        .await
                        .is_ok_and(|m| m.is_file())
                    {
                        stale_children.push(existing);
                    }
                    own.extend(results);
                }
                assessments.push(assessment);
            }

            let parent_path = context_path(&self.paths.context_dir, &domain, None);
            if children.is_empty() {
                let reason = format!("{} analyzed file(s)", file_count(&own));
                plans.push(DomainUpdatePlan::new(
                    domain.clone(),
                    PlanKind::Standard,
                    parent_path,
                    own,
                    reason,
                ));
                continue;
            }

            let child_names: Vec<String> = children.iter().map(|(s, _)| s.clone()).collect();
            plans.push(DomainUpdatePlan::new(
                domain.clone(),
                PlanKind::Parent {
                    children: child_names.clone(),
                },
                parent_path,
                own,
                format!("integration view over {}", child_names.join(", ")),
            ));
            for (sub, results) in children {
                let reason = format!("granular context for {}", sub);
                plans.push(DomainUpdatePlan::new(
                    format!("{}.{}", domain, sub),
                    PlanKind::Child {
                        parent: domain.clone(),
                    },
                    context_path(&self.paths.context_dir, &domain, Some(&sub)),
                    results,
                    reason,
                ));
            }
        }

        PlacementOutcome {
            plans: plan::sort_plans(plans),
            stale_children,
            affected_domains,
            assessments,
        }
    }

    /// Render every plan and translate the results into file operations
    async fn generate(
        &self,
        mut plans: Vec<DomainUpdatePlan>,
        stale_children: &[PathBuf],
    ) -> Result<GeneratedContent> {
        let mut rendered: BTreeMap<String, String> = BTreeMap::new();
        for plan in &plans {
            let level = ComplexityLevel::for_results(&plan.sources);
            let content = self
                .templates
                .render(&plan.domain, &plan.sources, level)
                .await
                .map_err(|e| match e {
                    GatewayError::Collaborator { .. } => e,
                    other => GatewayError::collaborator(self.templates.name(), other.to_string()),
                })?;
            rendered.insert(plan.domain.clone(), content.content);
        }

        let mut consistency = Vec::new();
        for plan in &plans {
            let PlanKind::Parent { children } = &plan.kind else {
                continue;
            };
            let parent_content = rendered.get(&plan.domain).cloned().unwrap_or_default();
            let child_contents: Vec<ChildContent> = children
                .iter()
                .map(|sub| {
                    let name = format!("{}.{}", plan.domain, sub);
                    let concept_count = plans
                        .iter()
                        .find(|p| p.domain == name)
                        .map(|p| {
                            p.sources
                                .iter()
                                .flat_map(|r| r.business_concepts.iter())
                                .collect::<BTreeSet<_>>()
                                .len()
                        })
                        .unwrap_or(0);
                    ChildContent {
                        sub_domain: sub.clone(),
                        content: rendered.get(&name).cloned().unwrap_or_default(),
                        concept_count,
                    }
                })
                .collect();

            let specialized =
                ContentSpecializer::specialize(&plan.domain, &parent_content, child_contents);
            rendered.insert(plan.domain.clone(), specialized.parent_content);
            for child in specialized.children {
                rendered.insert(format!("{}.{}", plan.domain, child.sub_domain), child.content);
            }
            consistency.push(specialized.consistency);
        }

        let mut operations = Vec::new();
        for plan in &mut plans {
            let Some(content) = rendered.remove(&plan.domain) else {
                continue;
            };
            let unchanged = tokio::fs::read_to_string(&plan.context_path)
                .await
                .map(|existing| existing == content)
                .unwrap_or(false);
            plan.files.push(PlannedFile {
                path: plan.context_path.clone(),
                content: content.clone(),
            });
            if unchanged {
                tracing::debug!("{} unchanged", plan.context_path.display());
                continue;
            }
            operations.push(FileOperation::write(plan.context_path.clone(), content).await);
        }
        for stale in stale_children {
            tracing::info!("Removing stale granular context {}", stale.display());
            operations.push(FileOperation::delete(stale.clone()));
        }

        Ok(GeneratedContent {
            operations,
            consistency,
        })
    }

    /// Apply `operations` atomically, then snapshot or record the failure
    async fn commit(
        &self,
        operations: Vec<FileOperation>,
        budget: u64,
        update_id: &str,
        result: &mut HolisticUpdateResult,
        metrics: &mut PerformanceMetrics,
    ) -> std::result::Result<(), PhaseFailure> {
        let phase = UpdatePhase::FileOperations;
        let phase_budget = phase.budget(budget);
        let started = Instant::now();

        // The transaction runs to completion even if we stop waiting for it
        let atomic = self.atomic.clone();
        let mut handle =
            tokio::spawn(async move { atomic.execute_atomic_operations(operations).await });
        let (outcome, timed_out) = match tokio::time::timeout(phase_budget, &mut handle).await {
            Ok(joined) => (joined, false),
            Err(_) => (handle.await, true),
        };
        *metrics.slot(phase) = started.elapsed().as_secs_f64() * 1000.0;

        let outcome = outcome.map_err(|e| {
            PhaseFailure::new(phase, GatewayError::collaborator("atomic engine", e.to_string()))
        })?;
        result.transaction_id = Some(outcome.transaction_id.clone());
        let root = self.paths.project_root.clone();
        let domains = result.affected_domains.clone();

        if !outcome.success {
            let message = outcome
                .error
                .clone()
                .unwrap_or_else(|| "atomic transaction failed".to_string());
            let mut failure = PhaseFailure::new(phase, GatewayError::PartialWrite { message });
            if let Some(data) = &outcome.rollback_data {
                failure.rollback = Some(RollbackOutcome {
                    transaction_id: data.transaction_id.clone(),
                    restored: data.restored,
                    operations_reverted: data.operations.len(),
                    restore_errors: data.restore_errors.clone(),
                });
                if let Err(e) = self
                    .rollback
                    .record_failed_transaction(update_id, &domains, &root, data)
                    .await
                {
                    tracing::warn!("Failed to record failed transaction {}: {}", update_id, e);
                }
            }
            return Err(failure);
        }

        let executed = outcome
            .rollback_data
            .map(|d| d.operations)
            .unwrap_or(outcome.operations_executed);
        let snapshot = self
            .rollback
            .create_snapshot(update_id, &domains, &root, &executed)
            .await;

        if timed_out {
            // Committed after the budget ran out: undo it so the caller's failure is accurate
            let restore = match snapshot {
                Ok(_) => self.rollback.restore_snapshot(update_id).await,
                Err(e) => Err(e),
            };
            let mut failure = PhaseFailure::new(
                phase,
                GatewayError::Timeout {
                    phase: phase.as_str().to_string(),
                    budget_ms: phase_budget.as_millis() as u64,
                },
            );
            failure.rollback = Some(match restore {
                Ok(count) => RollbackOutcome {
                    transaction_id: outcome.transaction_id,
                    restored: true,
                    operations_reverted: count,
                    restore_errors: Vec::new(),
                },
                Err(e) => RollbackOutcome {
                    transaction_id: outcome.transaction_id,
                    restored: false,
                    operations_reverted: 0,
                    restore_errors: vec![e.to_string()],
                },
            });
            return Err(failure);
        }

        match snapshot {
            Ok(_) => {
                result.snapshot_created = true;
                let store = self.rollback.clone();
                tokio::spawn(async move {
                    if let Err(e) = store.trigger_cleanup("post-update").await {
                        tracing::warn!("Post-update rollback cleanup failed: {}", e);
                    }
                });
            }
            Err(e) => tracing::warn!("Snapshot for {} not stored: {}", update_id, e),
        }
        tracing::info!(
            "Update {} committed {} context file(s)",
            update_id,
            executed.len()
        );
        Ok(())
    }

    /// Rollback retention, stale transactions, analysis cache
    pub async fn perform_maintenance(&self) -> Result<MaintenanceReport> {
        let rollback_cleanup = self.rollback.trigger_cleanup("scheduled").await?;
        let transactions_purged = self
            .atomic
            .cleanup_old_transactions(self.transaction_max_age)
            .await?;
        let cache_entries_pruned = match &self.analysis_cache {
            Some(cache) => cache.prune().await?,
            None => 0,
        };
        tracing::info!(
            "Maintenance: {} snapshot(s), {} transaction(s), {} cache entr(ies) removed",
            rollback_cleanup.removed_count,
            transactions_purged,
            cache_entries_pruned
        );
        Ok(MaintenanceReport {
            rollback_cleanup,
            transactions_purged,
            cache_entries_pruned,
        })
    }
}

fn file_count(results: &[AnalysisResult]) -> usize {
    results
        .iter()
        .map(|r| &r.file_path)
        .collect::<BTreeSet<_>>()
        .len()
}
