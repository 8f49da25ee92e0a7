//! End-to-end scenarios

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use context_gateway::orchestrator::UpdatePhase;
use context_gateway::session::SessionMetadata;
use context_gateway::{
    Collaborators, CoordinationRequest, GatewayServer, HolisticUpdateRequest, TriggerType,
};

use crate::common::*;

#[tokio::test]
async fn sub_domain_change_updates_parent_context_only() {
    let project = TestProject::new();
    project.add_class("Analysis/Fractal/X.cs", "Analysis.Fractal", "X", &[]);
    let gateway = project.gateway().await;

    let result = gateway
        .orchestrator()
        .execute_holistic_update(HolisticUpdateRequest::new(
            vec![project.file("Analysis/Fractal/X.cs")],
            TriggerType::FileChange,
            30_000,
        ))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.affected_domains, vec!["Analysis"]);
    assert_eq!(result.updated_context_files.len(), 1);
    assert!(project.read_context("Analysis").unwrap().contains("- X"));
    assert!(project.read_context("Analysis/Fractal").is_none());
}

#[tokio::test]
async fn unrelated_domains_share_one_phase() {
    let project = TestProject::new();
    project.with_unrelated_domains();
    let gateway = project.gateway().await;

    let mut request = CoordinationRequest::new(
        vec![
            PathBuf::from("Billing/Invoice.cs"),
            PathBuf::from("Shipping/Parcel.cs"),
            PathBuf::from("Catalog/Product.cs"),
        ],
        TriggerType::Manual,
    );
    request.dry_run = true;
    let result = gateway.coordinator().coordinate_update(request).await;

    assert!(result.success, "{:?}", result.error);
    let mut sequence = result.update_sequence.clone();
    sequence.sort();
    assert_eq!(sequence, vec!["Billing", "Catalog", "Shipping"]);

    let plan = result.plan.unwrap();
    assert_eq!(plan.phases.len(), 1);
    assert_eq!(plan.phases[0].domains.len(), 3);
    assert!(plan.entries.iter().all(|e| e.dependencies.is_empty()));
}

#[tokio::test]
async fn slow_analysis_times_out_with_metrics() {
    let project = TestProject::new();
    project.add_class("Billing/Invoice.cs", "Billing", "Invoice", &[]);
    let collaborators = Collaborators {
        analyzer: Arc::new(SlowAnalyzer::new(
            project.path().to_path_buf(),
            Duration::from_secs(2),
        )),
        ..project.collaborators()
    };
    let gateway = project.gateway_with(collaborators).await;
    let before = project.file_tree();

    let result = gateway
        .orchestrator()
        .execute_holistic_update(HolisticUpdateRequest::new(
            vec![project.file("Billing/Invoice.cs")],
            TriggerType::Manual,
            1_000,
        ))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_category.as_deref(), Some("timeout"));
    assert!(result.error.unwrap().contains("timed out"));
    assert_eq!(result.failed_phase, Some(UpdatePhase::SemanticAnalysis));
    assert!(result.performance_metrics.semantic_analysis_time > 0.0);
    assert_same_tree(&before, &project.file_tree());
}

#[tokio::test]
async fn dry_run_plans_the_sequence_a_real_run_uses() {
    let project = TestProject::new();
    project.with_dependency_chain();
    let gateway = project.gateway().await;
    let files = vec![PathBuf::from("Billing/Invoice.cs")];
    let before = project.file_tree();

    let mut dry = CoordinationRequest::new(files.clone(), TriggerType::Manual);
    dry.dry_run = true;
    let planned = gateway.coordinator().coordinate_update(dry).await;
    assert!(planned.success, "{:?}", planned.error);
    assert_same_tree(&before, &project.file_tree());
    let plan = planned.plan.expect("dry run returns its plan");

    let executed = gateway
        .coordinator()
        .coordinate_update(CoordinationRequest::new(files, TriggerType::Manual))
        .await;
    assert!(executed.success, "{:?}", executed.error);
    assert_eq!(plan.update_sequence, executed.update_sequence);
    assert_eq!(executed.update_sequence, vec!["Billing", "Orders", "Reports"]);
    assert!(project.read_context("Reports").is_some());
}

#[tokio::test]
async fn disconnect_cancels_exactly_the_outstanding_requests() {
    let project = TestProject::new();
    let gateway = project.gateway().await;
    let server = GatewayServer::new(Arc::clone(&gateway), SessionMetadata::default()).unwrap();
    let session_id = server.session_id().to_string();

    let mut releases = Vec::new();
    let mut handles = Vec::new();
    for _ in 0..3 {
        let (tx, rx) = oneshot::channel::<()>();
        releases.push(tx);
        let gateway = Arc::clone(&gateway);
        let session_id = session_id.clone();
        handles.push(tokio::spawn(async move {
            gateway
                .executor()
                .execute_with_session(&session_id, "predict-change-impact", rx, |rx| async move {
                    let _ = rx.await;
                })
                .await
        }));
    }
    while gateway.executor().active_request_count() < 3 {
        tokio::task::yield_now().await;
    }

    assert_eq!(gateway.executor().cancel_session_requests(&session_id), 3);
    assert_eq!(gateway.executor().cancel_session_requests(&session_id), 0);

    server.disconnect();
    assert!(gateway.sessions().get_session(&session_id).is_none());

    for tx in releases {
        let _ = tx.send(());
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(gateway.executor().active_request_count(), 0);
}
