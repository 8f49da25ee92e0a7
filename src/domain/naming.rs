//! Path conventions that map source files onto domains
//!
//! `src/Billing/Invoices/Invoice.cs` belongs to domain `Billing`, sub-domain
//! `Invoices`. Leading source-root directories are skipped; files at the root
//! belong to [`ROOT_DOMAIN`].

use std::path::Path;

use crate::fs_utils::relative_path;

/// Domain owning files that sit directly in the project (or source) root
pub const ROOT_DOMAIN: &str = "Root";

/// Directory names that carry no domain meaning when they lead a path
pub const SOURCE_ROOT_SEGMENTS: &[&str] = &[
    "src", "lib", "app", "source", "sources", "pkg", "internal", "packages", "modules", "main",
    "java", "kotlin", "scala",
];

/// Domains that serve every other domain rather than one business area
pub const CROSS_CUTTING_DOMAINS: &[&str] = &[
    "Logging",
    "Common",
    "Shared",
    "Utils",
    "Utilities",
    "Infrastructure",
    "Security",
    "Config",
    "Configuration",
    "Core",
    "Telemetry",
];

/// Where a file sits in the domain hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainLocation {
    pub domain: String,
    pub sub_domain: Option<String>,
}

impl DomainLocation {
    pub fn root() -> Self {
        Self {
            domain: ROOT_DOMAIN.to_string(),
            sub_domain: None,
        }
    }

    /// `Domain` or `Domain.Sub`
    pub fn qualified(&self) -> String {
        match &self.sub_domain {
            Some(sub) => format!("{}.{}", self.domain, sub),
            None => self.domain.clone(),
        }
    }
}

fn is_source_root(segment: &str) -> bool {
    SOURCE_ROOT_SEGMENTS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(segment))
}

/// Infer the domain of a forward-slash relative path
pub fn infer_location(relative: &str) -> DomainLocation {
    let mut dirs: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
    // Last segment is the file itself
    dirs.pop();

    let meaningful: Vec<&str> = dirs
        .into_iter()
        .skip_while(|segment| is_source_root(segment))
        .collect();

    match meaningful.as_slice() {
        [] => DomainLocation::root(),
        [domain] => DomainLocation {
            domain: domain.to_string(),
            sub_domain: None,
        },
        [domain, sub, ..] => DomainLocation {
            domain: domain.to_string(),
            sub_domain: Some(sub.to_string()),
        },
    }
}

/// Infer the domain of a file path, relative to `project_root` when possible
pub fn location_for_path(path: &Path, project_root: &Path) -> DomainLocation {
    infer_location(&relative_path(path, project_root))
}

/// Canonical cross-cutting name for `name`, if it is one
pub fn cross_cutting_name(name: &str) -> Option<&'static str> {
    CROSS_CUTTING_DOMAINS
        .iter()
        .find(|c| c.eq_ignore_ascii_case(name))
        .copied()
}

pub fn is_cross_cutting(name: &str) -> bool {
    cross_cutting_name(name).is_some()
}

/// Cross-cutting domains named by an analyzer context such as `Acme.Logging.Sinks`
pub fn cross_cutting_from_context(context: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for segment in context.split(|c: char| c == '.' || c == ':' || c == '/' || c == '\\') {
        if let Some(name) = cross_cutting_name(segment) {
            if !found.iter().any(|f| f == name) {
                found.push(name.to_string());
            }
        }
    }
    found
}

/// Whether an analyzer context agrees with the path-derived domain
pub fn context_matches_domain(context: &str, domain: &str) -> bool {
    context
        .split(|c: char| c == '.' || c == ':' || c == '/' || c == '\\')
        .any(|segment| segment.eq_ignore_ascii_case(domain))
}
