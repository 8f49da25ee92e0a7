//! Concept grammar definitions
//!
//! Maps the semantic categories the analyzer cares about (business concepts,
//! key interfaces, rule functions, namespaces, control flow) onto the
//! tree-sitter node kinds of each supported language. The generic extractor
//! in `extract.rs` walks a syntax tree using one of these tables.

use crate::lang::Lang;

/// Node kinds of one language, grouped by what the extractor reports
#[derive(Debug, Clone)]
pub struct ConceptGrammar {
    pub name: &'static str,
    /// Reported as business concepts
    pub concept_nodes: &'static [&'static str],
    /// Reported as key interfaces
    pub interface_nodes: &'static [&'static str],
    /// Concept or interface depending on the child type (Go `type_spec`)
    pub type_spec_nodes: &'static [&'static str],
    /// Screened for rule-like names
    pub function_nodes: &'static [&'static str],
    /// First match becomes the domain context
    pub namespace_nodes: &'static [&'static str],
    /// Identifiers that may name a type declared elsewhere
    pub reference_nodes: &'static [&'static str],
    /// Each occurrence adds one to the complexity count
    pub control_flow_nodes: &'static [&'static str],
    pub name_field: &'static str,
}

const JS_FLOW: &[&str] = &[
    "if_statement", "for_statement", "for_in_statement", "while_statement", "do_statement",
    "switch_statement", "try_statement",
];

pub static CSHARP_GRAMMAR: ConceptGrammar = ConceptGrammar {
    name: "csharp",
    concept_nodes: &["class_declaration", "struct_declaration", "record_declaration", "enum_declaration"],
    interface_nodes: &["interface_declaration"],
    type_spec_nodes: &[],
    function_nodes: &["method_declaration", "local_function_statement"],
    namespace_nodes: &["namespace_declaration", "file_scoped_namespace_declaration"],
    reference_nodes: &["identifier"],
    control_flow_nodes: &[
        "if_statement", "for_statement", "foreach_statement", "while_statement", "do_statement",
        "switch_statement", "switch_expression", "try_statement",
    ],
    name_field: "name",
};

pub static JAVA_GRAMMAR: ConceptGrammar = ConceptGrammar {
    name: "java",
    concept_nodes: &["class_declaration", "enum_declaration", "record_declaration"],
    interface_nodes: &["interface_declaration"],
    type_spec_nodes: &[],
    function_nodes: &["method_declaration"],
    namespace_nodes: &["package_declaration"],
    reference_nodes: &["type_identifier"],
    control_flow_nodes: &[
        "if_statement", "for_statement", "enhanced_for_statement", "while_statement", "do_statement",
        "switch_expression", "try_statement",
    ],
    name_field: "name",
};

pub static KOTLIN_GRAMMAR: ConceptGrammar = ConceptGrammar {
    name: "kotlin",
    concept_nodes: &["class_declaration", "object_declaration"],
    interface_nodes: &[],
    type_spec_nodes: &[],
    function_nodes: &["function_declaration"],
    namespace_nodes: &["package_header"],
    reference_nodes: &["type_identifier", "identifier"],
    control_flow_nodes: &[
        "if_expression", "when_expression", "for_statement", "while_statement", "do_while_statement",
        "try_expression",
    ],
    name_field: "name",
};

pub static TYPESCRIPT_GRAMMAR: ConceptGrammar = ConceptGrammar {
    name: "typescript",
    concept_nodes: &["class_declaration", "enum_declaration", "type_alias_declaration"],
    interface_nodes: &["interface_declaration"],
    type_spec_nodes: &[],
    function_nodes: &["function_declaration", "method_definition"],
    namespace_nodes: &["internal_module"],
    reference_nodes: &["type_identifier", "identifier"],
    control_flow_nodes: JS_FLOW,
    name_field: "name",
};

pub static JAVASCRIPT_GRAMMAR: ConceptGrammar = ConceptGrammar {
    name: "javascript",
    concept_nodes: &["class_declaration"],
    interface_nodes: &[],
    type_spec_nodes: &[],
    function_nodes: &["function_declaration", "method_definition"],
    namespace_nodes: &[],
    reference_nodes: &["identifier"],
    control_flow_nodes: JS_FLOW,
    name_field: "name",
};

pub static PYTHON_GRAMMAR: ConceptGrammar = ConceptGrammar {
    name: "python",
    concept_nodes: &["class_definition"],
    interface_nodes: &[],
    type_spec_nodes: &[],
    function_nodes: &["function_definition"],
    namespace_nodes: &[],
    reference_nodes: &["identifier"],
    control_flow_nodes: &["if_statement", "for_statement", "while_statement", "match_statement", "try_statement"],
    name_field: "name",
};

pub static GO_GRAMMAR: ConceptGrammar = ConceptGrammar {
    name: "go",
    concept_nodes: &[],
    interface_nodes: &[],
    type_spec_nodes: &["type_spec"],
    function_nodes: &["function_declaration", "method_declaration"],
    namespace_nodes: &["package_clause"],
    reference_nodes: &["type_identifier"],
    control_flow_nodes: &[
        "if_statement", "for_statement", "expression_switch_statement", "type_switch_statement",
        "select_statement",
    ],
    name_field: "name",
};

pub static RUST_GRAMMAR: ConceptGrammar = ConceptGrammar {
    name: "rust",
    concept_nodes: &["struct_item", "enum_item"],
    interface_nodes: &["trait_item"],
    type_spec_nodes: &[],
    function_nodes: &["function_item"],
    namespace_nodes: &[],
    reference_nodes: &["type_identifier"],
    control_flow_nodes: &["if_expression", "match_expression", "for_expression", "while_expression", "loop_expression"],
    name_field: "name",
};

pub fn grammar_for(lang: Lang) -> &'static ConceptGrammar {
    match lang {
        Lang::CSharp => &CSHARP_GRAMMAR,
        Lang::Java => &JAVA_GRAMMAR,
        Lang::Kotlin => &KOTLIN_GRAMMAR,
        Lang::TypeScript | Lang::Tsx => &TYPESCRIPT_GRAMMAR,
        Lang::JavaScript => &JAVASCRIPT_GRAMMAR,
        Lang::Python => &PYTHON_GRAMMAR,
        Lang::Go => &GO_GRAMMAR,
        Lang::Rust => &RUST_GRAMMAR,
    }
}

/// Verbs that mark a function as encoding a business rule
pub const RULE_VERBS: &[&str] = &[
    "validate",
    "check",
    "ensure",
    "calculate",
    "compute",
    "apply",
    "enforce",
    "can",
    "is",
    "should",
    "must",
    "verify",
    "determine",
];

/// `validateOrder`, `validate_order` and `ValidateOrder` are rules; `issue` is not
pub fn is_rule_name(name: &str) -> bool {
    RULE_VERBS.iter().any(|verb| {
        let Some(prefix) = name.get(..verb.len()) else {
            return false;
        };
        if !prefix.eq_ignore_ascii_case(verb) {
            return false;
        }
        match name[verb.len()..].chars().next() {
            Some(c) => c == '_' || c.is_uppercase(),
            None => false,
        }
    })
}
