//! Lifecycle-scoped gateway registry
//!
//! Everything a running gateway shares (sessions, request tracking, the
//! coordinator and its plan registry) is built here at startup and torn down
//! by [`Gateway::shutdown`]. Nothing lives in process-wide statics.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::analyzer::{AnalysisCache, CachedAnalyzer, SemanticAnalyzer, TreeSitterAnalyzer};
use crate::approval::{ApprovalWorkflow, AutoApproval};
use crate::config::{GatewayConfig, ResolvedPaths};
use crate::coordinator::CrossDomainCoordinator;
use crate::domain::DomainGraphBuilder;
use crate::error::Result;
use crate::health::{check_health, HealthReport};
use crate::orchestrator::UpdateOrchestrator;
use crate::rollback::RollbackStore;
use crate::session::{SessionAwareExecutor, SessionManager};
use crate::template::{MarkdownTemplateEngine, TemplateEngine};

/// External collaborators the pipeline calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub analyzer: Arc<dyn SemanticAnalyzer>,
    pub templates: Arc<dyn TemplateEngine>,
    pub approval: Arc<dyn ApprovalWorkflow>,
}

impl Collaborators {
    /// Tree-sitter analysis (cached when enabled), Markdown templates, auto-approval
    pub fn defaults(config: &GatewayConfig, paths: &ResolvedPaths) -> Self {
        let analyzer = TreeSitterAnalyzer::new(paths.project_root.clone());
        let analyzer: Arc<dyn SemanticAnalyzer> = if config.analysis_cache.enabled {
            Arc::new(CachedAnalyzer::new(analyzer, analysis_cache(config, paths)))
        } else {
            Arc::new(analyzer)
        };
        Self {
            analyzer,
            templates: Arc::new(MarkdownTemplateEngine::new(paths.project_root.clone())),
            approval: Arc::new(AutoApproval),
        }
    }
}

fn analysis_cache(config: &GatewayConfig, paths: &ResolvedPaths) -> AnalysisCache {
    AnalysisCache::new(
        paths.cache_dir.clone(),
        chrono::Duration::hours(config.analysis_cache.max_age_hours as i64),
    )
}

pub struct Gateway {
    config: GatewayConfig,
    paths: ResolvedPaths,
    sessions: Arc<SessionManager>,
    executor: Arc<SessionAwareExecutor>,
    coordinator: Arc<CrossDomainCoordinator>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started_at: DateTime<Utc>,
}

impl Gateway {
    /// Build a gateway for `project_root` with the default collaborators
    pub async fn open(project_root: &Path, config: GatewayConfig) -> Result<Self> {
        let paths = config.resolve_paths(project_root);
        let collaborators = Collaborators::defaults(&config, &paths);
        Self::with_collaborators(project_root, config, collaborators).await
    }

    pub async fn with_collaborators(
        project_root: &Path,
        config: GatewayConfig,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;
        let paths = config.resolve_paths(project_root);

        tokio::fs::create_dir_all(&paths.transaction_dir).await?;
        if config.analysis_cache.enabled {
            tokio::fs::create_dir_all(&paths.cache_dir).await?;
        }
        let rollback =
            Arc::new(RollbackStore::open(paths.rollback_dir.clone(), config.rollback.clone()).await?);

        let mut orchestrator = UpdateOrchestrator::new(
            &config,
            paths.clone(),
            Arc::clone(&collaborators.analyzer),
            collaborators.templates,
            rollback,
        );
        if config.analysis_cache.enabled {
            orchestrator = orchestrator.with_analysis_cache(analysis_cache(&config, &paths));
        }

        let builder = DomainGraphBuilder::new(
            paths.project_root.clone(),
            collaborators.analyzer,
            config.impact.clone(),
        );
        let coordinator = CrossDomainCoordinator::new(
            &config,
            builder,
            Arc::new(orchestrator),
            collaborators.approval,
        );

        tracing::info!("Gateway ready for {}", paths.project_root.display());
        Ok(Self {
            sessions: Arc::new(SessionManager::from_config(&config)),
            executor: Arc::new(SessionAwareExecutor::new()),
            coordinator: Arc::new(coordinator),
            tasks: Mutex::new(Vec::new()),
            started_at: Utc::now(),
            config,
            paths,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    pub fn project_root(&self) -> &PathBuf {
        &self.paths.project_root
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn executor(&self) -> &Arc<SessionAwareExecutor> {
        &self.executor
    }

    pub fn coordinator(&self) -> &Arc<CrossDomainCoordinator> {
        &self.coordinator
    }

    pub fn orchestrator(&self) -> &Arc<UpdateOrchestrator> {
        self.coordinator.orchestrator()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn health(&self, tool_count: usize) -> HealthReport {
        check_health(&self.config, &self.paths, tool_count)
    }

    /// Start the session sweeper and the periodic maintenance task
    pub fn start_background_tasks(&self) {
        let executor = Arc::clone(&self.executor);
        let sweeper = self.sessions.start_sweeper(move |session_id| {
            executor.cancel_session_requests(session_id);
        });

        let orchestrator = Arc::clone(self.orchestrator());
        let period = self.config.maintenance_interval();
        let maintenance = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = orchestrator.perform_maintenance().await {
                    tracing::warn!("Scheduled maintenance failed: {}", e);
                }
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.push(sweeper);
        tasks.push(maintenance);
    }

    /// Stop background tasks and drop every session's bookkeeping
    pub async fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
            let _ = task.await;
        }
        for session in self.sessions.list_sessions() {
            self.executor.cancel_session_requests(&session.id);
            self.sessions.remove_session(&session.id);
        }
        tracing::info!("Gateway for {} shut down", self.paths.project_root.display());
    }
}
