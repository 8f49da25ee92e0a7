//! Tool surface: argument validation, envelopes and payloads

use std::sync::Arc;

use serde_json::json;
use tokio::sync::oneshot;

use context_gateway::mcp_server::{handle_request, ToolRequest, TOOL_NAMES};
use context_gateway::session::SessionMetadata;
use context_gateway::Gateway;

use crate::common::*;

#[test]
fn unknown_argument_is_a_validation_error() {
    let err = ToolRequest::from_call(
        "predict-change-impact",
        json!({ "changedFiles": ["Billing/Invoice.cs"], "includeEverything": true }),
    )
    .unwrap_err();
    assert_eq!(err.category(), "validation");

    let err = ToolRequest::from_call("analyze-everything", json!({})).unwrap_err();
    assert_eq!(err.category(), "not_found");
}

#[test]
fn depth_and_timeout_bounds_are_enforced() {
    let err = ToolRequest::from_call(
        "analyze-specific-domains-impact",
        json!({ "sourceDomains": ["Billing"], "maxPropagationDepth": 11 }),
    )
    .unwrap_err();
    assert_eq!(err.category(), "validation");

    let err = ToolRequest::from_call(
        "coordinate-cross-domain-update",
        json!({ "changedFiles": ["a.cs"], "triggerType": "manual", "performanceTimeout": 0 }),
    )
    .unwrap_err();
    assert_eq!(err.category(), "validation");

    assert!(ToolRequest::from_call("gateway-health", serde_json::Value::Null).is_ok());
    assert_eq!(TOOL_NAMES.len(), 6);
}

#[tokio::test]
async fn predict_without_risk_analysis_reports_no_risks() {
    let project = TestProject::new();
    project.with_dependency_chain();
    let gateway = project.gateway().await;
    let session = gateway
        .sessions()
        .add_session(SessionMetadata::default())
        .unwrap()
        .id;

    let request = ToolRequest::from_call(
        "predict-change-impact",
        json!({
            "changedFiles": ["Billing/Invoice.cs"],
            "includeRiskAnalysis": false,
            "includeRecommendations": false,
        }),
    )
    .unwrap();
    let envelope = handle_request(&gateway, &session, request, TOOL_NAMES.len()).await;

    assert_tool_success(&envelope);
    assert_eq!(envelope["prediction"]["riskFactors"], json!([]));
    assert_eq!(envelope["prediction"]["recommendations"], json!([]));
    assert_eq!(envelope["affectedDomains"], json!(3));
    assert_eq!(
        strings(&envelope["prediction"]["updateSequence"]),
        vec!["Billing", "Orders", "Reports"]
    );
}

#[tokio::test]
async fn coordinated_plan_is_visible_through_status() {
    let project = TestProject::new();
    project.with_billing_and_orders();
    let gateway = project.gateway().await;
    let session = gateway
        .sessions()
        .add_session(SessionMetadata::default())
        .unwrap()
        .id;

    let request = ToolRequest::from_call(
        "coordinate-cross-domain-update",
        json!({ "changedFiles": ["Billing/Invoice.cs"], "triggerType": "manual" }),
    )
    .unwrap();
    let envelope = handle_request(&gateway, &session, request, TOOL_NAMES.len()).await;
    assert_tool_success(&envelope);
    let plan_id = envelope["result"]["planId"]
        .as_str()
        .expect("plan id")
        .to_string();
    assert_eq!(
        strings(&envelope["result"]["updatedDomains"]),
        vec!["Billing", "Orders"]
    );

    let request = ToolRequest::from_call(
        "get-cross-domain-coordination-status",
        json!({ "planId": plan_id }),
    )
    .unwrap();
    let status = handle_request(&gateway, &session, request, TOOL_NAMES.len()).await;
    assert_tool_success(&status);
    assert_eq!(status["plan"]["status"], json!("completed"));

    let request =
        ToolRequest::from_call("get-cross-domain-coordination-status", json!({})).unwrap();
    let overview = handle_request(&gateway, &session, request, TOOL_NAMES.len()).await;
    assert_eq!(overview["activeCount"], json!(0));
    assert_eq!(overview["retainedPlans"], json!(1));
}

#[tokio::test]
async fn unknown_source_domain_fails_validation() {
    let project = TestProject::new();
    project.with_billing_and_orders();
    let gateway = project.gateway().await;
    let session = gateway
        .sessions()
        .add_session(SessionMetadata::default())
        .unwrap()
        .id;

    let request = ToolRequest::from_call(
        "analyze-specific-domains-impact",
        json!({ "sourceDomains": ["Warehouse"] }),
    )
    .unwrap();
    let envelope = handle_request(&gateway, &session, request, TOOL_NAMES.len()).await;

    assert_tool_failure(&envelope, "validation");
    assert!(envelope["error"].as_str().unwrap().contains("Warehouse"));
    assert_eq!(gateway.executor().active_request_count(), 0);
}

#[tokio::test]
async fn health_counts_its_own_request() {
    let project = TestProject::new();
    let gateway = project.gateway().await;
    let session = gateway
        .sessions()
        .add_session(SessionMetadata::default())
        .unwrap()
        .id;

    let request = ToolRequest::from_call("gateway-health", json!({})).unwrap();
    let envelope = handle_request(&gateway, &session, request, TOOL_NAMES.len()).await;

    assert_tool_success(&envelope);
    assert_eq!(envelope["activeRequests"], json!(1));
    assert_eq!(envelope["sessions"]["totalSessions"], json!(1));
    assert_eq!(envelope["activeCoordinations"], json!(0));
    assert!(envelope["startedAt"].is_string());
}

#[tokio::test]
async fn requests_from_other_sessions_stay_separate() {
    let project = TestProject::new();
    let gateway = project.gateway().await;
    let busy = gateway
        .sessions()
        .add_session(SessionMetadata::default())
        .unwrap()
        .id;
    let idle = gateway
        .sessions()
        .add_session(SessionMetadata::default())
        .unwrap()
        .id;

    let (tx, rx) = oneshot::channel::<()>();
    let held = {
        let gateway = Arc::clone(&gateway);
        let busy = busy.clone();
        tokio::spawn(async move {
            gateway
                .executor()
                .execute_with_session(&busy, "analyze-domain-map", rx, |rx| async move {
                    let _ = rx.await;
                })
                .await
        })
    };
    while gateway.executor().active_request_count() < 1 {
        tokio::task::yield_now().await;
    }

    assert_eq!(gateway.executor().cancel_session_requests(&idle), 0);
    assert_eq!(gateway.executor().get_session_requests(&busy).len(), 1);

    let _ = tx.send(());
    held.await.unwrap();
    assert!(gateway.executor().get_session_requests(&busy).is_empty());
}

#[tokio::test]
async fn swept_session_is_registered_again_before_serving() {
    let project = TestProject::new();
    let gateway = project.gateway().await;
    let session = gateway
        .sessions()
        .add_session(SessionMetadata::default())
        .unwrap()
        .id;
    gateway.sessions().remove_session(&session);

    let request = ToolRequest::from_call("gateway-health", json!({})).unwrap();
    let envelope = handle_request(&gateway, &session, request, TOOL_NAMES.len()).await;

    assert_tool_success(&envelope);
    assert_eq!(envelope["sessions"]["totalSessions"], json!(1));
    assert_eq!(envelope["activeRequests"], json!(1));
    assert!(gateway.sessions().get_session(&session).is_some());
}

#[tokio::test]
async fn swept_session_without_a_free_slot_is_refused() {
    let project = TestProject::new();
    let mut config = project.config();
    config.sessions.max_sessions = 1;
    let gateway = Arc::new(Gateway::open(project.path(), config).await.unwrap());
    let swept = gateway
        .sessions()
        .add_session(SessionMetadata::default())
        .unwrap()
        .id;
    gateway.sessions().remove_session(&swept);
    gateway.sessions().add_session(SessionMetadata::default()).unwrap();

    let request = ToolRequest::from_call("gateway-health", json!({})).unwrap();
    let envelope = handle_request(&gateway, &swept, request, TOOL_NAMES.len()).await;

    assert_eq!(envelope["success"], json!(false));
    assert_eq!(envelope["category"], json!("capacity"));
    assert_eq!(gateway.executor().active_request_count(), 0);
    assert!(gateway.executor().get_session_requests(&swept).is_empty());
}
