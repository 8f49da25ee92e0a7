//! Domain map construction
//!
//! Walks the project, runs the semantic analyzer, groups the results by the
//! path-derived domain, and infers relationships from cross-domain type
//! references.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use ignore::WalkBuilder;
use once_cell::sync::Lazy;
use regex::Regex;

use super::impact::absolute_path;
use super::model::{clamp_unit, Domain, DomainMap, DomainRelationship, RelationshipType};
use super::naming::{context_matches_domain, infer_location, is_cross_cutting, ROOT_DOMAIN};
use crate::analyzer::{AnalysisResult, SemanticAnalyzer};
use crate::config::ImpactConfig;
use crate::error::{GatewayError, Result};
use crate::fs_utils::relative_path;
use crate::lang::is_analyzable;

/// Floor applied to a relationship's strength once any evidence exists
const MIN_EVIDENCED_STRENGTH: f64 = 0.1;

const TEST_DIRS: &[&str] = &["test", "tests", "__tests__", "spec", "specs", "testing"];

/// `InvoiceTests.cs`, `invoice_test.go`, `test_invoice.py`, `cart.spec.ts`
static TEST_FILE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:test_[^.]*|[^.]*(?:Tests?|_test|Spec))(?:\.|$)|\.(?:test|spec)\.")
        .expect("test file pattern compiles")
});

/// Whether a forward-slash relative path looks like a test file
pub fn is_test_path(relative: &str) -> bool {
    let segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
    let Some((file, dirs)) = segments.split_last() else {
        return false;
    };
    let dir_hit = dirs.iter().any(|d| {
        let lower = d.to_ascii_lowercase();
        TEST_DIRS.contains(&lower.as_str()) || lower.ends_with(".tests") || lower.ends_with(".test")
    });
    if dir_hit {
        return true;
    }

    TEST_FILE_NAME.is_match(file)
}

/// Relative path of the production code a test file covers
fn test_subject(relative: &str) -> String {
    relative
        .split('/')
        .filter(|s| !TEST_DIRS.contains(&s.to_ascii_lowercase().as_str()))
        .map(|s| {
            s.strip_suffix(".Tests")
                .or_else(|| s.strip_suffix(".Test"))
                .unwrap_or(s)
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Directory of `domain` within a relative file path
fn domain_root(project_root: &Path, relative: &str, domain: &str) -> PathBuf {
    if domain == ROOT_DOMAIN {
        return project_root.to_path_buf();
    }
    let mut root = project_root.to_path_buf();
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        root.push(segment);
        if segment == domain {
            break;
        }
    }
    root
}

#[derive(Default)]
struct DomainStats {
    analyzed: usize,
    consistent: usize,
}

#[derive(Default)]
struct RelationshipEvidence {
    files: BTreeSet<String>,
    names: BTreeSet<String>,
    via_interface: bool,
}

/// Builds [`DomainMap`]s for one project
pub struct DomainGraphBuilder {
    project_root: PathBuf,
    analyzer: Arc<dyn SemanticAnalyzer>,
    config: ImpactConfig,
}

impl DomainGraphBuilder {
    pub fn new(project_root: PathBuf, analyzer: Arc<dyn SemanticAnalyzer>, config: ImpactConfig) -> Self {
        Self {
            project_root,
            analyzer,
            config,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Analyzable source and test files, honoring .gitignore and skipping hidden entries
    pub fn discover_files(&self) -> (Vec<PathBuf>, Vec<PathBuf>) {
        discover_files(&self.project_root, self.config.max_files)
    }

    /// Analyze the project into a domain map
    pub async fn analyze_domain_map(&self, changed_files: Option<&[PathBuf]>) -> Result<DomainMap> {
        let root = self.project_root.clone();
        let max_files = self.config.max_files;
        let (mut sources, tests) =
            tokio::task::spawn_blocking(move || discover_files(&root, max_files))
                .await
                .map_err(|e| GatewayError::collaborator("domain walk", e.to_string()))?;

        let changed: Vec<PathBuf> = changed_files
            .unwrap_or_default()
            .iter()
            .map(|f| absolute_path(&self.project_root, f))
            .collect();
        for file in &changed {
            if !is_analyzable(file) || sources.contains(file) {
                continue;
            }
            if tokio::fs::metadata(file).await.is_ok_and(|m| m.is_file()) {
                sources.push(file.clone());
            }
        }

        let results = self.analyzer.analyze(&sources).await?;
        tracing::debug!(
            "Analyzed {} of {} source file(s) with {}",
            results.len(),
            sources.len(),
            self.analyzer.name()
        );

        let mut domains: BTreeMap<String, Domain> = BTreeMap::new();
        let ensure = |domains: &mut BTreeMap<String, Domain>, relative: &str| -> String {
            let location = infer_location(relative);
            let domain = domains.entry(location.domain.clone()).or_insert_with(|| {
                Domain::new(
                    location.domain.clone(),
                    domain_root(&self.project_root, relative, &location.domain),
                )
            });
            if let Some(sub) = location.sub_domain {
                domain.sub_domains.insert(sub);
            }
            location.domain
        };

        for file in &sources {
            let relative = relative_path(file, &self.project_root);
            let name = ensure(&mut domains, &relative);
            if let Some(domain) = domains.get_mut(&name) {
                domain.source_files.push(relative);
            }
        }
        for file in &changed {
            ensure(&mut domains, &relative_path(file, &self.project_root));
        }

        // Per-domain analysis results, concept facts and consistency
        let mut by_domain: BTreeMap<String, Vec<&AnalysisResult>> = BTreeMap::new();
        let mut stats: BTreeMap<String, DomainStats> = BTreeMap::new();
        for result in &results {
            let relative = relative_path(&result.file_path, &self.project_root);
            let name = ensure(&mut domains, &relative);
            if let Some(domain) = domains.get_mut(&name) {
                domain
                    .business_concepts
                    .extend(result.business_concepts.iter().cloned());
                domain
                    .key_interfaces
                    .extend(result.key_interfaces.iter().cloned());
            }
            let entry = stats.entry(name.clone()).or_default();
            entry.analyzed += 1;
            if context_matches_domain(&result.domain_context, &name) {
                entry.consistent += 1;
            }
            by_domain.entry(name).or_default().push(result);
        }

        for file in &tests {
            let relative = relative_path(file, &self.project_root);
            let location = infer_location(&test_subject(&relative));
            if let Some(domain) = domains.get_mut(&location.domain) {
                domain.has_tests = true;
            }
        }

        let relationships = infer_relationships(&self.project_root, &domains, &by_domain);
        for domain in domains.values_mut() {
            let deps: BTreeSet<String> = relationships
                .iter()
                .filter(|r| r.source == domain.name)
                .map(|r| r.target.clone())
                .collect();
            domain.dependencies = deps.into_iter().collect();
            domain.source_files.sort();
            domain.source_files.dedup();

            let stat = stats.get(&domain.name);
            let analyzed = stat.map(|s| s.analyzed).unwrap_or(0);
            let consistent = stat.map(|s| s.consistent).unwrap_or(0);
            domain.confidence = domain_confidence(analyzed, domain.business_concepts.len(), consistent);
        }

        let connected: BTreeSet<&str> = relationships
            .iter()
            .flat_map(|r| [r.source.as_str(), r.target.as_str()])
            .collect();
        let isolated_domains = domains
            .keys()
            .filter(|d| !connected.contains(d.as_str()))
            .cloned()
            .collect();
        let cross_cutting_concerns = domains
            .keys()
            .filter(|d| is_cross_cutting(d))
            .cloned()
            .collect();

        tracing::info!(
            "Domain map: {} domain(s), {} relationship(s)",
            domains.len(),
            relationships.len()
        );

        Ok(DomainMap {
            domains,
            relationships,
            isolated_domains,
            cross_cutting_concerns,
            project_root: self.project_root.clone(),
            generated_at: Utc::now(),
        })
    }
}

/// Analyzable source and test files under `project_root`
fn discover_files(project_root: &Path, max_files: usize) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut builder = WalkBuilder::new(project_root);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .require_git(false)
        .follow_links(false);

    let mut sources = Vec::new();
    let mut tests = Vec::new();
    for entry in builder.build().flatten() {
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.into_path();
        if !is_analyzable(&path) {
            continue;
        }
        if is_test_path(&relative_path(&path, project_root)) {
            tests.push(path);
            continue;
        }
        if sources.len() >= max_files {
            tracing::warn!("Domain walk stopped at {} files (impact.max_files)", max_files);
            break;
        }
        sources.push(path);
    }
    sources.sort();
    tests.sort();
    (sources, tests)
}

/// Confidence from evidence volume and context consistency
pub fn domain_confidence(analyzed: usize, concepts: usize, consistent: usize) -> f64 {
    if analyzed == 0 {
        return 0.0;
    }
    let volume = 0.5 * (analyzed as f64 / 5.0).min(1.0) + 0.5 * (concepts as f64 / 5.0).min(1.0);
    let consistency = consistent as f64 / analyzed as f64;
    clamp_unit(0.6 * volume + 0.4 * consistency)
}

fn infer_relationships(
    project_root: &Path,
    domains: &BTreeMap<String, Domain>,
    by_domain: &BTreeMap<String, Vec<&AnalysisResult>>,
) -> Vec<DomainRelationship> {
    // type name -> (owning domain, declared as interface)
    let mut definitions: BTreeMap<&str, Vec<(&str, bool)>> = BTreeMap::new();
    for domain in domains.values() {
        for concept in &domain.business_concepts {
            definitions
                .entry(concept.as_str())
                .or_default()
                .push((domain.name.as_str(), false));
        }
        for interface in &domain.key_interfaces {
            definitions
                .entry(interface.as_str())
                .or_default()
                .push((domain.name.as_str(), true));
        }
    }

    let mut evidence: BTreeMap<(String, String), RelationshipEvidence> = BTreeMap::new();
    for (source, results) in by_domain {
        for result in results {
            for reference in &result.references {
                let Some(owners) = definitions.get(reference.as_str()) else {
                    continue;
                };
                for (target, is_interface) in owners {
                    if *target == source.as_str() {
                        continue;
                    }
                    let entry = evidence
                        .entry((source.clone(), target.to_string()))
                        .or_default();
                    entry
                        .files
                        .insert(relative_path(&result.file_path, project_root));
                    entry.names.insert(reference.clone());
                    entry.via_interface |= *is_interface;
                }
            }
        }
    }

    evidence
        .into_iter()
        .map(|((source, target), ev)| {
            let files_in_source = by_domain.get(&source).map(|r| r.len()).unwrap_or(1).max(1);
            let strength =
                (ev.files.len() as f64 / files_in_source as f64).max(MIN_EVIDENCED_STRENGTH);
            let relationship_type = if is_cross_cutting(&target) {
                RelationshipType::CrossCutting
            } else if ev.via_interface {
                RelationshipType::DependsOn
            } else {
                RelationshipType::Uses
            };
            let names: Vec<&str> = ev.names.iter().take(5).map(String::as_str).collect();
            let justification = format!(
                "{} of {} file(s) in {} reference {} type(s) from {}: {}",
                ev.files.len(),
                files_in_source,
                source,
                ev.names.len(),
                target,
                names.join(", ")
            );
            DomainRelationship::new(
                source,
                target,
                relationship_type,
                strength,
                ev.files.into_iter().collect(),
                justification,
            )
        })
        .collect()
}
