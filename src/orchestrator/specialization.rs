//! Parent/child content specialization
//!
//! When a domain has granular children, the parent document keeps the
//! integration view and each child keeps its implementation detail. A fact
//! (any non-empty, non-heading line) may live on one side only: duplicates are
//! removed from the parent. Both sides link to each other.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Rendered content of one child context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildContent {
    pub sub_domain: String,
    pub content: String,
    pub concept_count: usize,
}

/// Outcome of the consistency check between a parent and its children
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub parent: String,
    /// Parent facts dropped because a child already states them
    pub removed_from_parent: Vec<String>,
    /// Facts still present on both sides after specialization
    pub remaining_duplicates: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.remaining_duplicates.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecializedContent {
    pub parent_content: String,
    pub children: Vec<ChildContent>,
    pub consistency: ConsistencyReport,
}

/// Canonical form of a fact line, or `None` for headings and blank lines
pub fn normalize_fact(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let stripped = trimmed
        .trim_start_matches(|c: char| c == '-' || c == '*' || c == '>' || c.is_whitespace())
        .replace('`', "");
    let normalized = stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// All normalized facts of a document
pub fn facts_of(content: &str) -> BTreeSet<String> {
    content.lines().filter_map(normalize_fact).collect()
}

/// Facts that appear in both the parent and any child
pub fn shared_facts(parent: &str, children: &[ChildContent]) -> Vec<String> {
    let parent_facts = facts_of(parent);
    let mut shared: BTreeSet<String> = BTreeSet::new();
    for child in children {
        for fact in facts_of(&child.content) {
            if parent_facts.contains(&fact) {
                shared.insert(fact);
            }
        }
    }
    shared.into_iter().collect()
}

fn heading_level(line: &str) -> Option<usize> {
    let level = line.bytes().take_while(|b| *b == b'#').count();
    (level > 0 && line[level..].starts_with(' ')).then_some(level)
}

/// Drop `##` and deeper headings whose section became empty. A section is
/// empty when the next heading is at the same or a higher level; emptied
/// subsections empty their parent in turn.
fn drop_empty_sections(content: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for line in content.lines().rev() {
        if let Some(level) = heading_level(line).filter(|l| *l >= 2) {
            let next = kept.iter().rev().find(|l| !l.trim().is_empty());
            let empty = match next {
                None => true,
                Some(l) => heading_level(l).is_some_and(|n| n <= level),
            };
            if empty {
                continue;
            }
        }
        kept.push(line);
    }

    let mut out = String::with_capacity(content.len());
    for line in kept.iter().rev() {
        out.push_str(line);
        out.push('\n');
    }
    out
}

pub struct ContentSpecializer;

impl ContentSpecializer {
    pub fn specialize(
        parent_name: &str,
        parent_content: &str,
        children: Vec<ChildContent>,
    ) -> SpecializedContent {
        let child_facts: BTreeSet<String> = children
            .iter()
            .flat_map(|c| facts_of(&c.content))
            .collect();

        let mut removed = Vec::new();
        let mut parent = String::with_capacity(parent_content.len());
        for line in parent_content.lines() {
            if let Some(fact) = normalize_fact(line) {
                if child_facts.contains(&fact) {
                    removed.push(fact);
                    continue;
                }
            }
            parent.push_str(line);
            parent.push('\n');
        }
        let mut parent = drop_empty_sections(&parent);

        // Parent -> child navigation
        let _ = writeln!(parent, "## Sub-domain Contexts\n");
        let _ = writeln!(
            parent,
            "Implementation detail for these areas lives in dedicated documents:\n"
        );
        for child in &children {
            let _ = writeln!(
                parent,
                "- [{parent_name}.{sub}]({sub}/CONTEXT.md): {count} concept(s)",
                sub = child.sub_domain,
                count = child.concept_count,
            );
        }

        // Child -> parent navigation
        let children: Vec<ChildContent> = children
            .into_iter()
            .map(|mut child| {
                let hint = format!(
                    "> Part of the [{}](../CONTEXT.md) domain; see the parent document for how {} integrates with its siblings.\n\n",
                    parent_name, child.sub_domain
                );
                child.content = match child.content.split_once('\n') {
                    Some((title, rest)) if title.starts_with("# ") => {
                        format!("{}\n\n{}{}", title, hint, rest.trim_start_matches('\n'))
                    }
                    _ => format!("{}{}", hint, child.content),
                };
                child
            })
            .collect();

        let remaining_duplicates = shared_facts(&parent, &children);
        if !remaining_duplicates.is_empty() {
            tracing::warn!(
                "{} fact(s) still shared between {} and its children",
                remaining_duplicates.len(),
                parent_name
            );
        }

        SpecializedContent {
            parent_content: parent,
            children,
            consistency: ConsistencyReport {
                parent: parent_name.to_string(),
                removed_from_parent: removed,
                remaining_duplicates,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fact() {
        assert_eq!(normalize_fact("- `Invoice`").as_deref(), Some("invoice"));
        assert_eq!(normalize_fact("  *  Two   words ").as_deref(), Some("two words"));
        assert_eq!(normalize_fact("## Business Rules"), None);
        assert_eq!(normalize_fact("   "), None);
    }

    #[test]
    fn test_shared_facts_removed_from_parent() {
        let parent = "# Analysis Context\n\n## Business Concepts\n\n- Report\n- FractalSeries\n\n## Business Rules\n\n- `ComputeHurst`\n";
        let child = ChildContent {
            sub_domain: "Fractal".to_string(),
            content: "# Analysis.Fractal Context\n\n## Business Concepts\n\n- FractalSeries\n\n## Business Rules\n\n- `ComputeHurst`\n".to_string(),
            concept_count: 1,
        };

        let out = ContentSpecializer::specialize("Analysis", parent, vec![child]);

        assert_eq!(out.consistency.removed_from_parent, vec!["fractalseries", "computehurst"]);
        assert!(out.consistency.is_consistent());
        assert!(out.parent_content.contains("- Report"));
        assert!(!out.parent_content.contains("FractalSeries"));
        // Rules section emptied and dropped
        assert!(!out.parent_content.contains("## Business Rules"));
        assert!(out.parent_content.contains("(Fractal/CONTEXT.md)"));

        let child = &out.children[0];
        assert!(child.content.starts_with("# Analysis.Fractal Context\n\n> Part of the [Analysis](../CONTEXT.md)"));
        assert!(child.content.contains("- FractalSeries"));

        let parent_facts = facts_of(&out.parent_content);
        assert!(facts_of(&child.content).is_disjoint(&parent_facts));
    }

    #[test]
    fn test_section_with_only_subsections_is_kept() {
        let content = "# Billing\n\n## Business Rules\n\n### Invoices\n\n- `ValidateTotal`\n\n## Key Interfaces\n\n### Payments\n\n## Source Files\n\n- Invoice.cs\n";
        let out = drop_empty_sections(content);

        assert!(out.contains("## Business Rules\n\n### Invoices"));
        // Emptied subsection takes its parent with it
        assert!(!out.contains("### Payments"));
        assert!(!out.contains("## Key Interfaces"));
        assert!(out.starts_with("# Billing\n"));
        assert!(out.contains("## Source Files"));
    }
}
