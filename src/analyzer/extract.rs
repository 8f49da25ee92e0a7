//! Generic concept extraction over a tree-sitter syntax tree

use std::collections::BTreeSet;

use tree_sitter::Node;

use super::grammar::{is_rule_name, ConceptGrammar};

/// Facts pulled from one parsed file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFacts {
    pub namespace: Option<String>,
    pub concepts: Vec<String>,
    pub interfaces: Vec<String>,
    pub rules: Vec<String>,
    /// Type-like identifiers used but not declared in the file
    pub references: Vec<String>,
    /// Count of control-flow nodes
    pub complexity: u32,
}

const NAME_KINDS: &[&str] = &["identifier", "type_identifier", "simple_identifier"];

fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

/// Name of a declaration via its name field, else its first identifier child
fn declaration_name(node: &Node, source: &str, grammar: &ConceptGrammar) -> Option<String> {
    if let Some(name) = node.child_by_field_name(grammar.name_field) {
        return Some(node_text(&name, source).to_string());
    }
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .find(|c| NAME_KINDS.contains(&c.kind()))
        .map(|c| node_text(&c, source).to_string());
    found
}

/// Kotlin declares interfaces as `class_declaration` with an `interface` keyword
fn declares_interface(node: &Node) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == "interface");
    found
}

fn namespace_name(node: &Node, source: &str) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return Some(node_text(&name, source).to_string());
    }
    let first_line = node_text(node, source).lines().next().unwrap_or("");
    first_line
        .split_whitespace()
        .find(|word| *word != "package" && *word != "namespace")
        .map(|word| word.trim_end_matches([';', '{']).to_string())
        .filter(|word| !word.is_empty())
}

/// PascalCase identifier of some substance (not a CONSTANT, not `Id`)
fn looks_like_type(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && text.len() >= 3
        && text.chars().any(|c| c.is_ascii_lowercase())
        && text.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Walk the tree iteratively and collect concepts, interfaces, rules and references
pub fn extract_facts(root: Node, source: &str, grammar: &ConceptGrammar) -> ExtractedFacts {
    let mut facts = ExtractedFacts::default();
    let mut identifiers: BTreeSet<String> = BTreeSet::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        let kind = node.kind();

        if grammar.control_flow_nodes.contains(&kind) {
            facts.complexity += 1;
        }

        if facts.namespace.is_none() && grammar.namespace_nodes.contains(&kind) {
            facts.namespace = namespace_name(&node, source);
        }

        if grammar.interface_nodes.contains(&kind)
            || (grammar.concept_nodes.contains(&kind) && declares_interface(&node))
        {
            if let Some(name) = declaration_name(&node, source, grammar) {
                push_unique(&mut facts.interfaces, name);
            }
        } else if grammar.concept_nodes.contains(&kind) {
            if let Some(name) = declaration_name(&node, source, grammar) {
                push_unique(&mut facts.concepts, name);
            }
        } else if grammar.type_spec_nodes.contains(&kind) {
            let is_interface = node
                .child_by_field_name("type")
                .map(|t| t.kind() == "interface_type")
                .unwrap_or(false);
            if let Some(name) = declaration_name(&node, source, grammar) {
                if is_interface {
                    push_unique(&mut facts.interfaces, name);
                } else {
                    push_unique(&mut facts.concepts, name);
                }
            }
        }

        if grammar.function_nodes.contains(&kind) {
            if let Some(name) = declaration_name(&node, source, grammar) {
                if is_rule_name(&name) {
                    push_unique(&mut facts.rules, name);
                }
            }
        }

        if grammar.reference_nodes.contains(&kind) {
            let text = node_text(&node, source);
            if looks_like_type(text) {
                identifiers.insert(text.to_string());
            }
        }

        // Reverse so siblings are visited in source order
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    let namespace_segments: Vec<&str> = facts
        .namespace
        .as_deref()
        .map(|ns| ns.split('.').collect())
        .unwrap_or_default();

    facts.references = identifiers
        .into_iter()
        .filter(|id| {
            !facts.concepts.contains(id)
                && !facts.interfaces.contains(id)
                && !facts.rules.contains(id)
                && !namespace_segments.contains(&id.as_str())
        })
        .collect();

    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::grammar::grammar_for;
    use crate::lang::Lang;

    fn facts_for(lang: Lang, source: &str) -> ExtractedFacts {
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&lang.grammar()).unwrap();
        let tree = parser.parse(source, None).unwrap();
        extract_facts(tree.root_node(), source, grammar_for(lang))
    }

    #[test]
    fn test_csharp_extraction() {
        let source = r#"
namespace Acme.Analysis.Fractal
{
    public interface IRenderer { void Render(); }

    public class MandelbrotSet : IRenderer
    {
        private Palette palette;

        public bool ValidateBounds(int x) {
            if (x > 0) { return true; }
            return false;
        }

        public void Render() {
            for (var i = 0; i < 10; i++) { }
        }
    }
}
"#;
        let facts = facts_for(Lang::CSharp, source);
        assert_eq!(facts.namespace.as_deref(), Some("Acme.Analysis.Fractal"));
        assert_eq!(facts.concepts, vec!["MandelbrotSet".to_string()]);
        assert_eq!(facts.interfaces, vec!["IRenderer".to_string()]);
        assert_eq!(facts.rules, vec!["ValidateBounds".to_string()]);
        assert!(facts.references.contains(&"Palette".to_string()));
        assert!(!facts.references.contains(&"Analysis".to_string()));
        assert_eq!(facts.complexity, 2);
    }

    #[test]
    fn test_rust_extraction() {
        let source = r#"
pub struct Invoice { total: Money }
pub enum Status { Open, Paid }
pub trait Ledger { fn post(&self); }
fn calculate_tax(invoice: &Invoice) -> u64 {
    match invoice.total.0 { 0 => 0, n => n / 10 }
}
fn render() {}
"#;
        let facts = facts_for(Lang::Rust, source);
        assert_eq!(facts.concepts, vec!["Invoice".to_string(), "Status".to_string()]);
        assert_eq!(facts.interfaces, vec!["Ledger".to_string()]);
        assert_eq!(facts.rules, vec!["calculate_tax".to_string()]);
        assert_eq!(facts.references, vec!["Money".to_string()]);
        assert_eq!(facts.complexity, 1);
    }

    #[test]
    fn test_go_type_specs() {
        let source = r#"
package billing

type Invoice struct { ID string }
type Store interface { Save(i Invoice) error }

func ValidateInvoice(i Invoice) bool { if i.ID == "" { return false }; return true }
"#;
        let facts = facts_for(Lang::Go, source);
        assert_eq!(facts.namespace.as_deref(), Some("billing"));
        assert_eq!(facts.concepts, vec!["Invoice".to_string()]);
        assert_eq!(facts.interfaces, vec!["Store".to_string()]);
        assert_eq!(facts.rules, vec!["ValidateInvoice".to_string()]);
    }

    #[test]
    fn test_python_extraction() {
        let source = r#"
class Order:
    def is_valid(self):
        return True

def check_stock(order: Order) -> bool:
    for line in order.lines:
        pass
    return Inventory.has(order)
"#;
        let facts = facts_for(Lang::Python, source);
        assert_eq!(facts.concepts, vec!["Order".to_string()]);
        assert_eq!(
            facts.rules,
            vec!["is_valid".to_string(), "check_stock".to_string()]
        );
        assert_eq!(facts.references, vec!["Inventory".to_string()]);
    }

    #[test]
    fn test_looks_like_type() {
        assert!(looks_like_type("Invoice"));
        assert!(!looks_like_type("MAX_SIZE"));
        assert!(!looks_like_type("invoice"));
        assert!(!looks_like_type("Id"));
    }
}
