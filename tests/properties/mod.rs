//! Invariants that must hold across components

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;

use context_gateway::coordinator::plan::{EntryStatus, PlanStatus};
use context_gateway::domain::{analyze_specific_domains_impact, predict_change_impact};
use context_gateway::orchestrator::specialization::facts_of;
use context_gateway::session::SessionMetadata;
use context_gateway::{
    Collaborators, CoordinationRequest, Gateway, GatewayServer, HolisticUpdateRequest,
    TriggerType,
};

use crate::common::*;

#[tokio::test]
async fn failed_coordination_leaves_tree_byte_identical() {
    let project = TestProject::new();
    project
        .with_billing_and_orders()
        .add_file(".context/Billing/CONTEXT.md", "# Billing\n\nhand-written notes\n");
    let collaborators = Collaborators {
        templates: Arc::new(FailingTemplates::new(project.path().to_path_buf(), "Orders")),
        ..project.collaborators()
    };
    let gateway = project.gateway_with(collaborators).await;
    let before = project.file_tree();

    let result = gateway
        .coordinator()
        .coordinate_update(CoordinationRequest::new(
            vec![PathBuf::from("Billing/Invoice.cs")],
            TriggerType::Manual,
        ))
        .await;

    assert!(!result.success);
    assert_eq!(result.failed_domains, vec!["Orders"]);
    assert_eq!(result.rolled_back_domains, vec!["Billing"]);
    assert!(result.rollback_completed);
    assert_same_tree(&before, &project.file_tree());

    let plan = gateway
        .coordinator()
        .get_coordination_plan(result.plan_id.as_deref().unwrap())
        .unwrap();
    assert_eq!(plan.status, PlanStatus::RolledBack);
    assert_eq!(plan.domains_with(EntryStatus::RolledBack), vec!["Billing"]);
    assert_eq!(plan.domains_with(EntryStatus::Failed), vec!["Orders"]);
}

#[tokio::test]
async fn cleanup_twice_removes_nothing_the_second_time() {
    let project = TestProject::new();
    project.with_billing_and_orders();
    let gateway = project.gateway().await;
    let result = gateway
        .coordinator()
        .coordinate_update(CoordinationRequest::new(
            vec![PathBuf::from("Billing/Invoice.cs")],
            TriggerType::Manual,
        ))
        .await;
    assert!(result.success, "{:?}", result.error);

    let store = gateway.orchestrator().rollback_store();
    let snapshots = store.list_snapshots().await.len();
    store.trigger_cleanup("scheduled").await.unwrap();
    let second = store.trigger_cleanup("scheduled").await.unwrap();

    assert_eq!(second.removed_count, 0);
    assert_eq!(store.list_snapshots().await.len(), snapshots);

    let first = gateway.orchestrator().perform_maintenance().await.unwrap();
    let again = gateway.orchestrator().perform_maintenance().await.unwrap();
    assert_eq!(first.rollback_cleanup.removed_count, 0);
    assert_eq!(again.rollback_cleanup.removed_count, 0);
    assert_eq!(again.transactions_purged, 0);
}

#[tokio::test]
async fn propagation_depth_increases_along_every_path() {
    let project = TestProject::new();
    project.with_dependency_chain();
    let gateway = project.gateway().await;
    let config = gateway.config().impact.clone();
    let map = gateway
        .coordinator()
        .builder()
        .analyze_domain_map(None)
        .await
        .unwrap();

    let prediction =
        predict_change_impact(&map, &[PathBuf::from("Billing/Invoice.cs")], &config);
    assert_eq!(prediction.impact_graph.direct_domains(), vec!["Billing"]);
    let nodes = &prediction.impact_graph.nodes;
    assert!(nodes
        .values()
        .all(|n| n.propagation_depth < config.max_propagation_depth));
    assert!(!nodes.contains_key("Audit"));

    let impact = analyze_specific_domains_impact(
        &map,
        &["Billing".to_string()],
        None,
        true,
        Some(10),
        &config,
    )
    .unwrap();
    assert_eq!(impact.impact_graph.nodes["Audit"].propagation_depth, 3);
    for path in &impact.propagation_paths {
        for (index, domain) in path.domains.iter().enumerate() {
            assert_eq!(
                impact.impact_graph.nodes[domain].propagation_depth, index,
                "path {:?}",
                path.domains
            );
        }
    }
}

fn assert_counts_agree(gateway: &Gateway, sessions: &[String]) {
    let executor = gateway.executor();
    let per_session: usize = sessions
        .iter()
        .map(|s| executor.get_session_requests(s).len())
        .sum();
    assert_eq!(executor.get_all_active_requests().len(), per_session);
}

#[tokio::test]
async fn active_requests_are_never_double_counted() {
    let project = TestProject::new();
    let gateway = project.gateway().await;
    let sessions: Vec<String> = (0..3)
        .map(|_| {
            gateway
                .sessions()
                .add_session(SessionMetadata::default())
                .unwrap()
                .id
        })
        .collect();

    let mut releases: HashMap<usize, oneshot::Sender<()>> = HashMap::new();
    let mut handles = Vec::new();
    // 1, 2 and 3 requests on the three sessions
    let mut n = 0;
    for (i, session) in sessions.iter().enumerate() {
        for _ in 0..=i {
            let (tx, rx) = oneshot::channel::<()>();
            releases.insert(n, tx);
            n += 1;
            let gateway = Arc::clone(&gateway);
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                gateway
                    .executor()
                    .execute_with_session(&session, "gateway-health", rx, |rx| async move {
                        let _ = rx.await;
                    })
                    .await
            }));
        }
    }
    while gateway.executor().active_request_count() < 6 {
        tokio::task::yield_now().await;
    }
    assert_counts_agree(&gateway, &sessions);
    assert_eq!(gateway.executor().get_session_requests(&sessions[2]).len(), 3);

    // Finish one request of the last session
    let _ = releases.remove(&5).unwrap().send(());
    while gateway.executor().active_request_count() > 5 {
        tokio::task::yield_now().await;
    }
    assert_counts_agree(&gateway, &sessions);

    assert_eq!(gateway.executor().cancel_session_requests(&sessions[1]), 2);
    assert_counts_agree(&gateway, &sessions);
    assert_eq!(gateway.executor().active_request_count(), 3);

    for (_, tx) in releases {
        let _ = tx.send(());
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_counts_agree(&gateway, &sessions);
    assert_eq!(gateway.executor().active_request_count(), 0);
}

#[tokio::test]
async fn session_cap_rejects_with_the_limit() {
    let project = TestProject::new();
    let mut config = project.config();
    config.sessions.max_sessions = 2;
    let gateway = Arc::new(Gateway::open(project.path(), config).await.unwrap());

    let first = GatewayServer::new(Arc::clone(&gateway), SessionMetadata::default()).unwrap();
    let _second = GatewayServer::new(Arc::clone(&gateway), SessionMetadata::default()).unwrap();
    let err = GatewayServer::new(Arc::clone(&gateway), SessionMetadata::default())
        .err()
        .expect("third session must be rejected");

    assert_eq!(err.category(), "capacity");
    assert!(err.to_string().contains("(2)"));
    assert_eq!(gateway.sessions().metrics().total_sessions, 2);

    first.disconnect();
    assert!(GatewayServer::new(Arc::clone(&gateway), SessionMetadata::default()).is_ok());
}

const FRACTAL_SOURCE: &str = r#"
public class FractalSeries { }
public class FractalDimension { }
public class FractalWindow { }
public class SeriesSample { }
public class FractalMath {
    public double CalculateFractalDimension(int n) {
        double total = 0;
        for (int i = 0; i < n; i++) { if (i % 2 == 0) { total += i; } else { total -= 1; } }
        while (total > 100) { total /= 2; }
        for (int j = 0; j < n; j++) { if (j > 3) { total += j; } }
        return total;
    }
    public bool ValidateSeriesLength(int n) {
        if (n < 0) { return false; }
        if (n > 1000) { return false; }
        for (int k = 0; k < n; k++) { if (k == 7) { return true; } }
        return n % 2 == 0;
    }
    public double ComputeHurstExponent(int n) {
        double h = 0;
        for (int i = 0; i < n; i++) { if (i > 2) { h += 0.5; } else if (i > 1) { h -= 0.1; } }
        while (h > 1) { h -= 1; }
        return h;
    }
}
"#;

#[tokio::test]
async fn parent_and_child_contexts_share_no_facts() {
    let project = TestProject::new();
    project
        .add_file("Analysis/Report.cs", "public class Report { }")
        .add_file("Analysis/Fractal/Fractal.cs", FRACTAL_SOURCE);
    let gateway = project.gateway().await;

    let result = gateway
        .orchestrator()
        .execute_holistic_update(HolisticUpdateRequest::new(
            vec![
                project.file("Analysis/Report.cs"),
                project.file("Analysis/Fractal/Fractal.cs"),
            ],
            TriggerType::Manual,
            30_000,
        ))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.granular_contexts_created, vec!["Analysis.Fractal"]);
    let parent = project.read_context("Analysis").unwrap();
    let child = project.read_context("Analysis/Fractal").unwrap();
    let shared: Vec<String> = facts_of(&parent)
        .intersection(&facts_of(&child))
        .cloned()
        .collect();
    assert!(shared.is_empty(), "shared facts: {:?}", shared);
}

#[tokio::test]
async fn direct_domain_context_keeps_unchanged_files() {
    let project = TestProject::new();
    project
        .with_billing_and_orders()
        .add_class("Billing/Payment.cs", "Billing", "Payment", &[]);
    let gateway = project.gateway().await;

    let full = gateway
        .coordinator()
        .coordinate_update(CoordinationRequest::new(
            vec![
                PathBuf::from("Billing/Invoice.cs"),
                PathBuf::from("Billing/Payment.cs"),
            ],
            TriggerType::Manual,
        ))
        .await;
    assert!(full.success, "{:?}", full.error);
    assert!(project.read_context("Billing").unwrap().contains("Payment"));

    project.add_class("Billing/Invoice.cs", "Billing", "Invoice", &["Payment"]);
    let partial = gateway
        .coordinator()
        .coordinate_update(CoordinationRequest::new(
            vec![PathBuf::from("Billing/Invoice.cs")],
            TriggerType::Manual,
        ))
        .await;
    assert!(partial.success, "{:?}", partial.error);

    let context = project.read_context("Billing").unwrap();
    assert!(context.contains("Invoice"));
    assert!(context.contains("Payment"), "{}", context);
}
