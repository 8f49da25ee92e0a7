//! Tool execution and response envelopes
//!
//! Every tool answers with a JSON object: `{"success": true, ...}` merged with
//! the tool's payload, or `{"success": false, "error", "category", "timestamp"}`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::analyzer::TreeSitterAnalyzer;
use crate::coordinator::CoordinationRequest;
use crate::domain::model::DomainMap;
use crate::domain::{analyze_specific_domains_impact, predict_change_impact, DomainGraphBuilder};
use crate::error::{GatewayError, Result};
use crate::fs_utils::{canonical_or_self, normalize_path};
use crate::gateway::Gateway;
use crate::session::SessionMetadata;

use super::types::{
    to_paths, AnalyzeDomainMapArgs, CoordinateUpdateArgs, CoordinationStatusArgs,
    PredictChangeImpactArgs, SpecificDomainsImpactArgs, ToolRequest,
};

/// `{"success": true}` merged with the fields of `payload`
pub fn success_envelope(payload: Value) -> Value {
    let mut body = Map::new();
    body.insert("success".to_string(), Value::Bool(true));
    match payload {
        Value::Object(fields) => body.extend(fields),
        Value::Null => {}
        other => {
            body.insert("data".to_string(), other);
        }
    }
    Value::Object(body)
}

fn failure_body(message: &str, category: &str) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("success".to_string(), Value::Bool(false));
    body.insert("error".to_string(), Value::String(message.to_string()));
    body.insert("category".to_string(), Value::String(category.to_string()));
    body.insert(
        "timestamp".to_string(),
        Value::String(chrono::Utc::now().to_rfc3339()),
    );
    body
}

pub fn failure_envelope(error: &GatewayError) -> Value {
    Value::Object(failure_body(&error.to_string(), error.category()))
}

pub fn is_success(envelope: &Value) -> bool {
    envelope.get("success").and_then(Value::as_bool).unwrap_or(false)
}

/// Run `request` as a tracked request of `session_id` and wrap the outcome
pub async fn handle_request(
    gateway: &Gateway,
    session_id: &str,
    request: ToolRequest,
    tool_count: usize,
) -> Value {
    if let Err(e) = gateway
        .sessions()
        .touch_or_register(session_id, SessionMetadata::default())
    {
        tracing::warn!("Session {} not served: {}", session_id, e);
        return failure_envelope(&e);
    }
    let tool = request.tool_name();
    let outcome = gateway
        .executor()
        .execute_with_session(session_id, tool, request, |request| {
            dispatch(gateway, request, tool_count)
        })
        .await;

    match outcome {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("{} failed: {}", tool, e);
            failure_envelope(&e)
        }
    }
}

/// Validate and execute one request
pub async fn dispatch(gateway: &Gateway, request: ToolRequest, tool_count: usize) -> Result<Value> {
    request.validate()?;
    match request {
        ToolRequest::AnalyzeDomainMap(args) => analyze_domain_map(gateway, args).await,
        ToolRequest::PredictChangeImpact(args) => predict_impact(gateway, args).await,
        ToolRequest::CoordinateCrossDomainUpdate(args) => coordinate(gateway, args).await,
        ToolRequest::AnalyzeSpecificDomainsImpact(args) => specific_impact(gateway, args).await,
        ToolRequest::GetCrossDomainCoordinationStatus(args) => coordination_status(gateway, args),
        ToolRequest::GatewayHealth(_) => {
            let report = gateway.health(tool_count);
            Ok(success_envelope(json!({
                "health": report,
                "sessions": gateway.sessions().metrics(),
                "activeRequests": gateway.executor().active_request_count(),
                "activeCoordinations": gateway.coordinator().get_active_coordinations().len(),
                "startedAt": gateway.started_at(),
            })))
        }
    }
}

/// A project root other than the gateway's own, if `requested` names one
fn foreign_root(gateway: &Gateway, requested: Option<&str>) -> Result<Option<PathBuf>> {
    let Some(requested) = requested else {
        return Ok(None);
    };
    let path = Path::new(requested);
    if !path.is_dir() {
        return Err(GatewayError::validation(format!(
            "projectRoot is not a directory: {}",
            requested
        )));
    }
    let own = canonical_or_self(gateway.project_root());
    let requested = normalize_path(&path.canonicalize()?);
    Ok(if requested == own { None } else { Some(requested) })
}

async fn domain_map_for(
    gateway: &Gateway,
    project_root: Option<&str>,
    changed_files: Option<&[PathBuf]>,
) -> Result<DomainMap> {
    match foreign_root(gateway, project_root)? {
        None => {
            gateway
                .coordinator()
                .builder()
                .analyze_domain_map(changed_files)
                .await
        }
        Some(root) => {
            tracing::debug!("Analyzing foreign project {}", root.display());
            let analyzer = Arc::new(TreeSitterAnalyzer::new(root.clone()));
            DomainGraphBuilder::new(root, analyzer, gateway.config().impact.clone())
                .analyze_domain_map(changed_files)
                .await
        }
    }
}

async fn analyze_domain_map(gateway: &Gateway, args: AnalyzeDomainMapArgs) -> Result<Value> {
    let changed = args.changed_files.as_deref().map(to_paths);
    let map = domain_map_for(gateway, Some(&args.project_root), changed.as_deref()).await?;

    let mut payload = json!({
        "summary": {
            "domainCount": map.domains.len(),
            "relationshipCount": map.relationships.len(),
            "isolatedDomains": map.isolated_domains.len(),
            "crossCuttingConcerns": map.cross_cutting_concerns.len(),
        },
    });
    if args.include_visualization.unwrap_or(false) {
        payload["visualization"] = Value::String(map.to_mermaid());
    }
    payload["domainMap"] = serde_json::to_value(&map)?;
    Ok(success_envelope(payload))
}

async fn predict_impact(gateway: &Gateway, args: PredictChangeImpactArgs) -> Result<Value> {
    let changed = to_paths(&args.changed_files);
    let map = domain_map_for(gateway, args.project_root.as_deref(), Some(&changed)).await?;
    let mut prediction = predict_change_impact(&map, &changed, &gateway.config().impact);

    if !args.include_risk_analysis.unwrap_or(true) {
        prediction.risk_factors.clear();
    }
    if !args.include_recommendations.unwrap_or(true) {
        prediction.recommendations.clear();
    }

    Ok(success_envelope(json!({
        "changedFiles": args.changed_files,
        "affectedDomains": prediction.impact_graph.nodes.len(),
        "prediction": prediction,
    })))
}

async fn coordinate(gateway: &Gateway, args: CoordinateUpdateArgs) -> Result<Value> {
    let mut request = CoordinationRequest::new(to_paths(&args.changed_files), args.trigger_type);
    request.performance_timeout_ms = args.performance_timeout;
    request.dry_run = args.dry_run.unwrap_or(false);
    request.git_commit_hash = args.git_commit_hash;

    let result = gateway.coordinator().coordinate_update(request).await;
    if result.success {
        return Ok(success_envelope(json!({ "result": result })));
    }

    let message = result
        .error
        .clone()
        .unwrap_or_else(|| "coordination failed".to_string());
    let category = result
        .error_category
        .clone()
        .unwrap_or_else(|| "coordination".to_string());
    let mut body = failure_body(&message, &category);
    body.insert("result".to_string(), serde_json::to_value(&result)?);
    Ok(Value::Object(body))
}

async fn specific_impact(gateway: &Gateway, args: SpecificDomainsImpactArgs) -> Result<Value> {
    let map = domain_map_for(gateway, None, None).await?;
    let impact = analyze_specific_domains_impact(
        &map,
        &args.source_domains,
        args.target_domains.as_deref(),
        args.include_transitive_impacts.unwrap_or(false),
        args.max_propagation_depth,
        &gateway.config().impact,
    )?;
    Ok(success_envelope(json!({ "impact": impact })))
}

fn coordination_status(gateway: &Gateway, args: CoordinationStatusArgs) -> Result<Value> {
    let coordinator = gateway.coordinator();
    match args.plan_id {
        Some(id) => {
            let plan = coordinator
                .get_coordination_plan(&id)
                .ok_or_else(|| GatewayError::not_found("coordination plan", &id))?;
            Ok(success_envelope(json!({ "plan": plan })))
        }
        None => {
            let active = coordinator.get_active_coordinations();
            Ok(success_envelope(json!({
                "activeCount": active.len(),
                "retainedPlans": coordinator.plan_count(),
                "activeCoordinations": active,
            })))
        }
    }
}
