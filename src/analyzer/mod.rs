//! Semantic analysis of source files
//!
//! The [`SemanticAnalyzer`] trait is the boundary to whatever extracts business
//! concepts and rules from code. [`TreeSitterAnalyzer`] is the built-in
//! implementation; [`CachedAnalyzer`] wraps any analyzer with the on-disk
//! analysis cache.

mod cache;
mod extract;
mod grammar;

pub use cache::{AnalysisCache, CachedAnalyzer};
pub use extract::{extract_facts, ExtractedFacts};
pub use grammar::{grammar_for, is_rule_name, ConceptGrammar, RULE_VERBS};

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::naming::location_for_path;
use crate::error::{GatewayError, Result};
use crate::lang::Lang;

/// Analysis of one source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub file_path: PathBuf,
    /// Namespace/package, or the path-derived `Domain.Sub` when none is declared
    pub domain_context: String,
    pub business_concepts: Vec<String>,
    pub business_rules: Vec<String>,
    pub language: String,
    pub analysis_time_ms: f64,
    #[serde(default)]
    pub key_interfaces: Vec<String>,
    /// Type names used but declared elsewhere
    #[serde(default)]
    pub references: Vec<String>,
    /// Control-flow node count
    #[serde(default)]
    pub complexity: u32,
}

/// Extracts business concepts and rules from source files.
///
/// May return fewer results than inputs (unanalyzable files are skipped) but
/// never drops a file it parsed successfully.
#[async_trait]
pub trait SemanticAnalyzer: Send + Sync {
    async fn analyze(&self, files: &[PathBuf]) -> Result<Vec<AnalysisResult>>;

    fn name(&self) -> &str {
        "semantic analyzer"
    }
}

/// Default analyzer backed by tree-sitter grammars
#[derive(Debug, Clone)]
pub struct TreeSitterAnalyzer {
    project_root: PathBuf,
}

impl TreeSitterAnalyzer {
    pub fn new(project_root: PathBuf) -> Self {
        Self { project_root }
    }
}

#[async_trait]
impl SemanticAnalyzer for TreeSitterAnalyzer {
    async fn analyze(&self, files: &[PathBuf]) -> Result<Vec<AnalysisResult>> {
        let files: Vec<PathBuf> = files
            .iter()
            .filter(|f| Lang::from_path(f).is_some())
            .cloned()
            .collect();
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let root = self.project_root.clone();
        tokio::task::spawn_blocking(move || {
            files
                .par_iter()
                .filter_map(|path| match analyze_file(path, &root) {
                    Ok(result) => Some(result),
                    Err(e) => {
                        tracing::debug!("Skipping {}: {}", path.display(), e);
                        None
                    }
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| GatewayError::collaborator(self.name(), e.to_string()))
    }

    fn name(&self) -> &str {
        "tree-sitter analyzer"
    }
}

/// Parse one file and extract its facts
pub fn analyze_file(path: &Path, project_root: &Path) -> Result<AnalysisResult> {
    let started = Instant::now();
    let lang = Lang::from_path(path)
        .ok_or_else(|| GatewayError::validation(format!("unsupported file {}", path.display())))?;
    let source = std::fs::read_to_string(path)?;

    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&lang.grammar())
        .map_err(|e| GatewayError::collaborator("tree-sitter", e.to_string()))?;
    let tree = parser.parse(&source, None).ok_or_else(|| {
        GatewayError::collaborator("tree-sitter", format!("failed to parse {}", path.display()))
    })?;

    let facts = extract_facts(tree.root_node(), &source, grammar_for(lang));
    let domain_context = facts
        .namespace
        .clone()
        .unwrap_or_else(|| location_for_path(path, project_root).qualified());

    Ok(AnalysisResult {
        file_path: path.to_path_buf(),
        domain_context,
        business_concepts: facts.concepts,
        business_rules: facts.rules,
        language: lang.name().to_string(),
        analysis_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        key_interfaces: facts.interfaces,
        references: facts.references,
        complexity: facts.complexity,
    })
}
