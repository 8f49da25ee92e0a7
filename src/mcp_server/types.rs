//! Tool arguments
//!
//! Every tool takes a camelCase JSON object. Unknown fields are rejected at
//! deserialization and [`ToolRequest::validate`] checks the rest before
//! anything reaches the pipeline.

use std::path::PathBuf;

use rmcp::schemars;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::MAX_TIMEOUT_MS;
use crate::error::{GatewayError, Result};
use crate::orchestrator::TriggerType;

/// Deepest propagation a caller may ask for
pub const MAX_REQUESTED_DEPTH: usize = 10;

// ============================================================================
// Per-tool arguments
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnalyzeDomainMapArgs {
    #[schemars(description = "Root directory of the project to analyze")]
    pub project_root: String,

    #[schemars(description = "Changed files whose domains must appear in the map")]
    #[serde(default)]
    pub changed_files: Option<Vec<String>>,

    #[schemars(description = "Include a Mermaid graph of domains and relationships")]
    #[serde(default)]
    pub include_visualization: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PredictChangeImpactArgs {
    #[schemars(description = "Changed files, absolute or relative to the project root")]
    pub changed_files: Vec<String>,

    #[schemars(description = "Project root (defaults to the gateway's project)")]
    #[serde(default)]
    pub project_root: Option<String>,

    #[schemars(description = "Include risk factors (default: true)")]
    #[serde(default)]
    pub include_risk_analysis: Option<bool>,

    #[schemars(description = "Include recommendations (default: true)")]
    #[serde(default)]
    pub include_recommendations: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CoordinateUpdateArgs {
    #[schemars(description = "Changed files, absolute or relative to the project root")]
    pub changed_files: Vec<String>,

    #[schemars(description = "What triggered the update: git-commit, file-change, manual or scheduled")]
    pub trigger_type: TriggerType,

    #[schemars(description = "Per-domain update budget in milliseconds")]
    #[serde(default)]
    pub performance_timeout: Option<u64>,

    #[schemars(description = "Build and return the plan without executing it")]
    #[serde(default)]
    pub dry_run: Option<bool>,

    #[schemars(description = "Commit that triggered the update")]
    #[serde(default)]
    pub git_commit_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpecificDomainsImpactArgs {
    #[schemars(description = "Domains the change starts from")]
    pub source_domains: Vec<String>,

    #[schemars(description = "Only report impact on these domains")]
    #[serde(default)]
    pub target_domains: Option<Vec<String>>,

    #[schemars(description = "Follow impact beyond direct dependents (default: false)")]
    #[serde(default)]
    pub include_transitive_impacts: Option<bool>,

    #[schemars(description = "Propagation depth limit (default: configured depth)")]
    #[serde(default)]
    pub max_propagation_depth: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CoordinationStatusArgs {
    #[schemars(description = "Plan to report on; active plans when omitted")]
    #[serde(default)]
    pub plan_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct HealthArgs {}

// ============================================================================
// Tagged union
// ============================================================================

/// One validated tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "kebab-case")]
pub enum ToolRequest {
    AnalyzeDomainMap(AnalyzeDomainMapArgs),
    PredictChangeImpact(PredictChangeImpactArgs),
    CoordinateCrossDomainUpdate(CoordinateUpdateArgs),
    AnalyzeSpecificDomainsImpact(SpecificDomainsImpactArgs),
    GetCrossDomainCoordinationStatus(CoordinationStatusArgs),
    GatewayHealth(HealthArgs),
}

/// Tool names in registration order
pub const TOOL_NAMES: &[&str] = &[
    "analyze-domain-map",
    "predict-change-impact",
    "coordinate-cross-domain-update",
    "analyze-specific-domains-impact",
    "get-cross-domain-coordination-status",
    "gateway-health",
];

fn require_files(field: &str, files: &[String]) -> Result<()> {
    if files.is_empty() {
        return Err(GatewayError::validation(format!("{} must not be empty", field)));
    }
    if files.iter().any(|f| f.trim().is_empty()) {
        return Err(GatewayError::validation(format!(
            "{} must not contain empty paths",
            field
        )));
    }
    Ok(())
}

fn require_names(field: &str, names: &[String]) -> Result<()> {
    if names.iter().any(|n| n.trim().is_empty()) {
        return Err(GatewayError::validation(format!(
            "{} must not contain empty names",
            field
        )));
    }
    Ok(())
}

impl ToolRequest {
    /// Parse `arguments` for the tool called `name` and validate them
    pub fn from_call(name: &str, arguments: Value) -> Result<Self> {
        if !TOOL_NAMES.contains(&name) {
            return Err(GatewayError::not_found("tool", name));
        }
        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let request: ToolRequest =
            serde_json::from_value(serde_json::json!({ "tool": name, "arguments": arguments }))
                .map_err(|e| GatewayError::validation(format!("invalid arguments for {}: {}", name, e)))?;
        request.validate()?;
        Ok(request)
    }

    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::AnalyzeDomainMap(_) => TOOL_NAMES[0],
            Self::PredictChangeImpact(_) => TOOL_NAMES[1],
            Self::CoordinateCrossDomainUpdate(_) => TOOL_NAMES[2],
            Self::AnalyzeSpecificDomainsImpact(_) => TOOL_NAMES[3],
            Self::GetCrossDomainCoordinationStatus(_) => TOOL_NAMES[4],
            Self::GatewayHealth(_) => TOOL_NAMES[5],
        }
    }

    /// Checks serde cannot express
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::AnalyzeDomainMap(args) => {
                if args.project_root.trim().is_empty() {
                    return Err(GatewayError::validation("projectRoot must not be empty"));
                }
                if let Some(files) = &args.changed_files {
                    if files.iter().any(|f| f.trim().is_empty()) {
                        return Err(GatewayError::validation(
                            "changedFiles must not contain empty paths",
                        ));
                    }
                }
                Ok(())
            }
            Self::PredictChangeImpact(args) => {
                require_files("changedFiles", &args.changed_files)?;
                if matches!(&args.project_root, Some(root) if root.trim().is_empty()) {
                    return Err(GatewayError::validation("projectRoot must not be empty"));
                }
                Ok(())
            }
            Self::CoordinateCrossDomainUpdate(args) => {
                require_files("changedFiles", &args.changed_files)?;
                if let Some(timeout) = args.performance_timeout {
                    if timeout == 0 || timeout > MAX_TIMEOUT_MS {
                        return Err(GatewayError::validation(format!(
                            "performanceTimeout must be within 1..={}ms",
                            MAX_TIMEOUT_MS
                        )));
                    }
                }
                Ok(())
            }
            Self::AnalyzeSpecificDomainsImpact(args) => {
                if args.source_domains.is_empty() {
                    return Err(GatewayError::validation("sourceDomains must not be empty"));
                }
                require_names("sourceDomains", &args.source_domains)?;
                if let Some(targets) = &args.target_domains {
                    require_names("targetDomains", targets)?;
                }
                if let Some(depth) = args.max_propagation_depth {
                    if depth == 0 || depth > MAX_REQUESTED_DEPTH {
                        return Err(GatewayError::validation(format!(
                            "maxPropagationDepth must be within 1..={}",
                            MAX_REQUESTED_DEPTH
                        )));
                    }
                }
                Ok(())
            }
            Self::GetCrossDomainCoordinationStatus(args) => {
                if matches!(&args.plan_id, Some(id) if id.trim().is_empty()) {
                    return Err(GatewayError::validation("planId must not be empty"));
                }
                Ok(())
            }
            Self::GatewayHealth(_) => Ok(()),
        }
    }
}

/// Changed-file strings as paths
pub fn to_paths(files: &[String]) -> Vec<PathBuf> {
    files.iter().map(PathBuf::from).collect()
}
