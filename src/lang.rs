//! Source languages the default analyzer parses

use std::path::Path;
use tree_sitter::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    TypeScript,
    Tsx,
    JavaScript,
    Rust,
    Python,
    Go,
    Java,
    CSharp,
    Kotlin,
}

/// Extension (lowercase) to language
const EXTENSIONS: &[(&str, Lang)] = &[
    ("cs", Lang::CSharp),
    ("ts", Lang::TypeScript),
    ("mts", Lang::TypeScript),
    ("cts", Lang::TypeScript),
    ("tsx", Lang::Tsx),
    ("js", Lang::JavaScript),
    ("mjs", Lang::JavaScript),
    ("cjs", Lang::JavaScript),
    ("jsx", Lang::JavaScript),
    ("rs", Lang::Rust),
    ("py", Lang::Python),
    ("go", Lang::Go),
    ("java", Lang::Java),
    ("kt", Lang::Kotlin),
    ("kts", Lang::Kotlin),
];

impl Lang {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        EXTENSIONS
            .iter()
            .find(|(candidate, _)| *candidate == ext)
            .map(|(_, lang)| *lang)
    }

    /// Reported as `AnalysisResult::language`
    pub fn name(&self) -> &'static str {
        match self {
            Self::TypeScript | Self::Tsx => "typescript",
            Self::JavaScript => "javascript",
            Self::Rust => "rust",
            Self::Python => "python",
            Self::Go => "go",
            Self::Java => "java",
            Self::CSharp => "csharp",
            Self::Kotlin => "kotlin",
        }
    }

    pub fn grammar(&self) -> Language {
        match self {
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::Go => tree_sitter_go::LANGUAGE.into(),
            Self::Java => tree_sitter_java::LANGUAGE.into(),
            Self::CSharp => tree_sitter_c_sharp::LANGUAGE.into(),
            Self::Kotlin => tree_sitter_kotlin_ng::LANGUAGE.into(),
        }
    }
}

/// Whether a file contributes to the domain map and to context documents
pub fn is_analyzable(path: &Path) -> bool {
    Lang::from_path(path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_by_extension() {
        let cases = [
            ("Billing/Invoice.cs", Some(Lang::CSharp)),
            ("Billing/INVOICE.CS", Some(Lang::CSharp)),
            ("web/cart.tsx", Some(Lang::Tsx)),
            ("web/cart.jsx", Some(Lang::JavaScript)),
            ("pkg/orders/order.go", Some(Lang::Go)),
            ("build.gradle.kts", Some(Lang::Kotlin)),
            ("README.md", None),
            ("Makefile", None),
        ];
        for (path, expected) in cases {
            assert_eq!(Lang::from_path(Path::new(path)), expected, "{}", path);
        }
    }

    #[test]
    fn test_tsx_reports_typescript() {
        assert_eq!(Lang::Tsx.name(), "typescript");
        assert!(is_analyzable(Path::new("Analysis/Fractal/Mandelbrot.cs")));
        assert!(!is_analyzable(Path::new(".context/Billing/CONTEXT.md")));
    }
}
