//! Collaborator doubles

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use context_gateway::analyzer::{AnalysisResult, SemanticAnalyzer, TreeSitterAnalyzer};
use context_gateway::error::{GatewayError, Result};
use context_gateway::template::{ComplexityLevel, MarkdownTemplateEngine, RenderedContent};
use context_gateway::TemplateEngine;

/// Sleeps before delegating to tree-sitter
pub struct SlowAnalyzer {
    pub inner: TreeSitterAnalyzer,
    pub delay: Duration,
}

impl SlowAnalyzer {
    pub fn new(project_root: PathBuf, delay: Duration) -> Self {
        Self {
            inner: TreeSitterAnalyzer::new(project_root),
            delay,
        }
    }
}

#[async_trait]
impl SemanticAnalyzer for SlowAnalyzer {
    async fn analyze(&self, files: &[PathBuf]) -> Result<Vec<AnalysisResult>> {
        tokio::time::sleep(self.delay).await;
        self.inner.analyze(files).await
    }

    fn name(&self) -> &str {
        "slow analyzer"
    }
}

/// Renders Markdown, except for domains starting with `failing_domain`
pub struct FailingTemplates {
    pub inner: MarkdownTemplateEngine,
    pub failing_domain: &'static str,
}

impl FailingTemplates {
    pub fn new(project_root: PathBuf, failing_domain: &'static str) -> Self {
        Self {
            inner: MarkdownTemplateEngine::new(project_root),
            failing_domain,
        }
    }
}

#[async_trait]
impl TemplateEngine for FailingTemplates {
    async fn render(
        &self,
        domain_path: &str,
        results: &[AnalysisResult],
        level: ComplexityLevel,
    ) -> Result<RenderedContent> {
        if domain_path.starts_with(self.failing_domain) {
            return Err(GatewayError::collaborator(
                "failing templates",
                format!("refusing to render {}", domain_path),
            ));
        }
        self.inner.render(domain_path, results, level).await
    }

    fn name(&self) -> &str {
        "failing templates"
    }
}
