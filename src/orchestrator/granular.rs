//! Granular (child) context qualification
//!
//! A sub-domain gets its own context document only when it carries enough
//! distinct, algorithm-heavy material to be worth reading on its own.
//! Otherwise its analysis folds into the parent domain.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::analyzer::AnalysisResult;
use crate::config::GranularConfig;
use crate::domain::model::clamp_unit;

const CONCEPT_WEIGHT: f64 = 0.25;
const RULE_WEIGHT: f64 = 0.25;
const COMPLEXITY_WEIGHT: f64 = 0.2;
const COHERENCE_WEIGHT: f64 = 0.15;
const AI_VALUE_WEIGHT: f64 = 0.15;

/// Name fragments that mark algorithmic code
const ALGORITHMIC_VOCABULARY: &[&str] = &[
    "algorithm", "calculat", "comput", "transform", "pars", "optimi", "score", "fractal",
    "matrix", "graph", "solve", "estimat", "predict", "analy", "aggregat", "encod", "decod",
    "hash", "sort", "search", "render", "simulat", "interpolat", "normaliz",
];

/// Split `ValidateInvoiceTotal` / `validate_invoice_total` into lowercase words
pub fn split_identifier(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if c == '_' || c == '-' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Signals behind one qualification decision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GranularAssessment {
    pub sub_domain: String,
    pub qualifies: bool,
    pub confidence: f64,
    pub concept_count: usize,
    pub rule_count: usize,
    pub complexity_score: f64,
    pub coherence_score: f64,
    pub ai_value_score: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GranularQualifier {
    config: GranularConfig,
}

impl GranularQualifier {
    pub fn new(config: GranularConfig) -> Self {
        Self { config }
    }

    pub fn assess(&self, sub_domain: &str, results: &[AnalysisResult]) -> GranularAssessment {
        let concepts: BTreeSet<&str> = results
            .iter()
            .flat_map(|r| r.business_concepts.iter().map(String::as_str))
            .collect();
        let rules: BTreeSet<&str> = results
            .iter()
            .flat_map(|r| r.business_rules.iter().map(String::as_str))
            .collect();

        let min_concepts = self.config.min_business_concepts.max(1);
        let min_rules = self.config.min_business_rules.max(1);
        let concept_score = (concepts.len() as f64 / (2 * min_concepts) as f64).min(1.0);
        let rule_score = (rules.len() as f64 / (2 * min_rules) as f64).min(1.0);
        let complexity_score = complexity_score(results, &concepts, &rules);
        let coherence_score = coherence_score(&concepts);
        let ai_value_score = ai_value_score(&rules);

        let confidence = clamp_unit(
            CONCEPT_WEIGHT * concept_score
                + RULE_WEIGHT * rule_score
                + COMPLEXITY_WEIGHT * complexity_score
                + COHERENCE_WEIGHT * coherence_score
                + AI_VALUE_WEIGHT * ai_value_score,
        );

        let mut reasons = Vec::new();
        if concepts.len() < self.config.min_business_concepts {
            reasons.push(format!(
                "{} business concept(s), {} required",
                concepts.len(),
                self.config.min_business_concepts
            ));
        }
        if rules.len() < self.config.min_business_rules {
            reasons.push(format!(
                "{} business rule(s), {} required",
                rules.len(),
                self.config.min_business_rules
            ));
        }
        if confidence < self.config.confidence_threshold {
            reasons.push(format!(
                "confidence {:.2} below threshold {:.2}",
                confidence, self.config.confidence_threshold
            ));
        }

        GranularAssessment {
            sub_domain: sub_domain.to_string(),
            qualifies: reasons.is_empty(),
            confidence,
            concept_count: concepts.len(),
            rule_count: rules.len(),
            complexity_score,
            coherence_score,
            ai_value_score,
            reasons,
        }
    }
}

/// Control-flow density plus algorithmic vocabulary
fn complexity_score(results: &[AnalysisResult], concepts: &BTreeSet<&str>, rules: &BTreeSet<&str>) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let control_flow: u32 = results.iter().map(|r| r.complexity).sum();
    let density = control_flow as f64 / results.len() as f64;

    let vocabulary_hits = concepts
        .iter()
        .chain(rules.iter())
        .filter(|name| {
            let lower = name.to_lowercase();
            ALGORITHMIC_VOCABULARY.iter().any(|term| lower.contains(term))
        })
        .count();

    0.7 * (density / 10.0).min(1.0) + 0.3 * (vocabulary_hits as f64 / 3.0).min(1.0)
}

/// Share of concepts that share a name word with another concept
fn coherence_score(concepts: &BTreeSet<&str>) -> f64 {
    if concepts.len() < 2 {
        return 0.0;
    }
    let words: Vec<BTreeSet<String>> = concepts
        .iter()
        .map(|c| split_identifier(c).into_iter().filter(|w| w.len() > 2).collect())
        .collect();

    let mut frequency: BTreeMap<&str, usize> = BTreeMap::new();
    for set in &words {
        for word in set {
            *frequency.entry(word.as_str()).or_insert(0) += 1;
        }
    }
    let connected = words
        .iter()
        .filter(|set| set.iter().any(|w| frequency.get(w.as_str()).copied().unwrap_or(0) > 1))
        .count();
    connected as f64 / concepts.len() as f64
}

/// Share of rules named specifically enough to inform a reader
fn ai_value_score(rules: &BTreeSet<&str>) -> f64 {
    if rules.is_empty() {
        return 0.0;
    }
    let specific = rules
        .iter()
        .filter(|r| split_identifier(r).len() >= 3)
        .count();
    specific as f64 / rules.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn result(concepts: &[&str], rules: &[&str], complexity: u32) -> AnalysisResult {
        AnalysisResult {
            file_path: PathBuf::from("/repo/Analysis/Fractal/X.cs"),
            domain_context: "Analysis.Fractal".to_string(),
            business_concepts: concepts.iter().map(|s| s.to_string()).collect(),
            business_rules: rules.iter().map(|s| s.to_string()).collect(),
            language: "csharp".to_string(),
            analysis_time_ms: 1.0,
            key_interfaces: Vec::new(),
            references: Vec::new(),
            complexity,
        }
    }

    #[test]
    fn test_split_identifier() {
        assert_eq!(split_identifier("ValidateInvoiceTotal"), vec!["validate", "invoice", "total"]);
        assert_eq!(split_identifier("compute_mandel_set"), vec!["compute", "mandel", "set"]);
        assert_eq!(split_identifier("HTTPServer"), vec!["httpserver"]);
    }

    #[test]
    fn test_rich_sub_domain_qualifies() {
        let qualifier = GranularQualifier::new(GranularConfig::default());
        let results = vec![
            result(
                &["FractalSeries", "FractalDimension", "FractalWindow"],
                &["CalculateFractalDimension", "ValidateSeriesLength"],
                18,
            ),
            result(&["SeriesSample"], &["ComputeHurstExponent"], 14),
        ];
        let assessment = qualifier.assess("Fractal", &results);
        assert!(assessment.qualifies, "{:?}", assessment.reasons);
        assert!(assessment.confidence >= 0.6);
    }

    #[test]
    fn test_thin_sub_domain_folds() {
        let qualifier = GranularQualifier::new(GranularConfig::default());
        let assessment = qualifier.assess("Fractal", &[result(&["X"], &[], 0)]);
        assert!(!assessment.qualifies);
        assert_eq!(assessment.concept_count, 1);
        assert!(assessment.reasons.iter().any(|r| r.contains("business rule")));
    }

    #[test]
    fn test_counts_alone_are_not_enough() {
        let qualifier = GranularQualifier::new(GranularConfig::default());
        // Enough names, but unrelated, flat and vague
        let assessment = qualifier.assess("Misc", &[result(&["Foo", "Bar", "Baz"], &["IsOk", "CanGo"], 0)]);
        assert!(!assessment.qualifies);
        assert!(assessment.reasons.iter().any(|r| r.contains("confidence")));
    }
}
