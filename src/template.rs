//! Context document rendering
//!
//! [`TemplateEngine`] turns a domain's analysis results into a context
//! document. [`MarkdownTemplateEngine`] is the built-in renderer.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::analyzer::AnalysisResult;
use crate::error::Result;
use crate::fs_utils::relative_path;

/// How much detail a rendered document carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

impl ComplexityLevel {
    /// Pick a level from the volume of facts and control flow in `results`
    pub fn for_results(results: &[AnalysisResult]) -> Self {
        let facts: usize = results
            .iter()
            .map(|r| r.business_concepts.len() + r.business_rules.len() + r.key_interfaces.len())
            .sum();
        let control_flow: u32 = results.iter().map(|r| r.complexity).sum();
        if facts >= 20 || control_flow >= 40 {
            Self::High
        } else if facts >= 5 || control_flow >= 10 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Output of one render call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedContent {
    pub content: String,
    pub token_estimate: usize,
    pub sections: Vec<String>,
}

impl RenderedContent {
    pub fn from_content(content: String, sections: Vec<String>) -> Self {
        Self {
            token_estimate: estimate_tokens(&content),
            content,
            sections,
        }
    }
}

/// Rough token count (4 characters per token)
pub fn estimate_tokens(content: &str) -> usize {
    content.len().div_ceil(4)
}

#[async_trait]
pub trait TemplateEngine: Send + Sync {
    async fn render(
        &self,
        domain_path: &str,
        results: &[AnalysisResult],
        level: ComplexityLevel,
    ) -> Result<RenderedContent>;

    fn name(&self) -> &str {
        "template engine"
    }
}

/// Renders Markdown context documents
#[derive(Debug, Clone)]
pub struct MarkdownTemplateEngine {
    project_root: PathBuf,
}

impl MarkdownTemplateEngine {
    pub fn new(project_root: PathBuf) -> Self {
        Self { project_root }
    }

    fn render_sync(
        &self,
        domain_path: &str,
        results: &[AnalysisResult],
        level: ComplexityLevel,
    ) -> RenderedContent {
        let concepts: BTreeSet<&str> = results
            .iter()
            .flat_map(|r| r.business_concepts.iter().map(String::as_str))
            .collect();
        let interfaces: BTreeSet<&str> = results
            .iter()
            .flat_map(|r| r.key_interfaces.iter().map(String::as_str))
            .collect();
        let languages: BTreeSet<&str> = results.iter().map(|r| r.language.as_str()).collect();
        let files: Vec<String> = results
            .iter()
            .map(|r| relative_path(&r.file_path, &self.project_root))
            .collect();

        let mut out = String::new();
        let mut sections = Vec::new();

        let _ = writeln!(out, "# {} Context\n", domain_path);

        sections.push("Overview".to_string());
        let _ = writeln!(out, "## Overview\n");
        let _ = writeln!(
            out,
            "The {} domain spans {} source file(s) ({}) defining {} business concept(s).\n",
            domain_path,
            results.len(),
            languages.into_iter().collect::<Vec<_>>().join(", "),
            concepts.len()
        );

        if !concepts.is_empty() {
            sections.push("Business Concepts".to_string());
            let _ = writeln!(out, "## Business Concepts\n");
            for concept in &concepts {
                let _ = writeln!(out, "- {}", concept);
            }
            out.push('\n');
        }

        if level >= ComplexityLevel::Medium && !interfaces.is_empty() {
            sections.push("Key Interfaces".to_string());
            let _ = writeln!(out, "## Key Interfaces\n");
            for interface in &interfaces {
                let _ = writeln!(out, "- {}", interface);
            }
            out.push('\n');
        }

        let has_rules = results.iter().any(|r| !r.business_rules.is_empty());
        if has_rules {
            sections.push("Business Rules".to_string());
            let _ = writeln!(out, "## Business Rules\n");
            for (result, file) in results.iter().zip(&files) {
                for rule in &result.business_rules {
                    if level == ComplexityLevel::High {
                        let _ = writeln!(out, "- `{}` in {}", rule, file);
                    } else {
                        let _ = writeln!(out, "- `{}`", rule);
                    }
                }
            }
            out.push('\n');
        }

        if level >= ComplexityLevel::Medium && !files.is_empty() {
            sections.push("Source Files".to_string());
            let _ = writeln!(out, "## Source Files\n");
            for (result, file) in results.iter().zip(&files) {
                if level == ComplexityLevel::High {
                    let _ = writeln!(
                        out,
                        "- {} (control flow: {}, context: {})",
                        file, result.complexity, result.domain_context
                    );
                } else {
                    let _ = writeln!(out, "- {}", file);
                }
            }
            out.push('\n');
        }

        RenderedContent::from_content(out, sections)
    }
}

#[async_trait]
impl TemplateEngine for MarkdownTemplateEngine {
    async fn render(
        &self,
        domain_path: &str,
        results: &[AnalysisResult],
        level: ComplexityLevel,
    ) -> Result<RenderedContent> {
        Ok(self.render_sync(domain_path, results, level))
    }

    fn name(&self) -> &str {
        "markdown template engine"
    }
}
