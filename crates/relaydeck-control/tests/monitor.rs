//! Fleet monitor tests against a real SQLite store and fake backends

mod common;

use common::*;
use relaydeck_control::{
    DatabaseFleetSource, Evaluator, EvaluatorConfig, FleetMonitor, HealthScorer, MonitorError,
};
use relaydeck_proto::topology::edge_id;
use relaydeck_proto::{AlertKind, CallerScope, EdgeStatus, RelayStatus, ScopeError, Severity};
use serde_json::json;
use std::sync::Arc;

struct Fleet {
    monitor: FleetMonitor,
    acme: i32,
    globex: i32,
    alpha: i32,
    bravo: i32,
    key_a: i32,
    key_b: i32,
}

/// Two tenants with one relay each plus a stopped global relay.
/// Globex's key is also assigned to acme's relay.
async fn fleet() -> Fleet {
    let db = setup_test_db().await;

    let acme = insert_tenant(&db, "acme", 1).await;
    let globex = insert_tenant(&db, "globex", 10).await;

    let alpha = insert_relay(&db, "alpha", 40001, Some(acme.id)).await;
    let bravo = insert_relay(&db, "bravo", 40002, Some(globex.id)).await;
    let core = insert_relay(&db, "core", 40003, None).await;

    let key_a = insert_key(&db, "acme-hq", Some(acme.id)).await;
    let key_b = insert_key(&db, "globex-lab", Some(globex.id)).await;
    link(&db, alpha.id, key_a.id, 0).await;
    link(&db, alpha.id, key_b.id, 1).await;
    link(&db, bravo.id, key_b.id, 0).await;

    let orchestrator = FakeOrchestrator::default()
        .with_status("alpha", RelayStatus::Running, 0)
        .with_status("bravo", RelayStatus::Running, 0)
        .with_status(&core.name, RelayStatus::Stopped, 0);

    let stats = FakeStats::default().with_doc(
        "alpha",
        json!({
            "total_handshakes": 20,
            "successful_handshakes": 20,
            "total_bytes_transferred": 1048576,
            "peers": {"p1": {"status": 1, "endpoint": "198.51.100.7:51820"}}
        }),
    );

    let evaluator = Evaluator::new(
        Arc::new(orchestrator),
        Arc::new(stats),
        HealthScorer::default(),
        EvaluatorConfig::default(),
    );
    let monitor = FleetMonitor::new(Arc::new(DatabaseFleetSource::new(db)), evaluator);

    Fleet {
        monitor,
        acme: acme.id,
        globex: globex.id,
        alpha: alpha.id,
        bravo: bravo.id,
        key_a: key_a.id,
        key_b: key_b.id,
    }
}

#[tokio::test]
async fn test_admin_summary_covers_whole_fleet() {
    let fleet = fleet().await;
    let summary = fleet
        .monitor
        .summary(&CallerScope::new("admin", None))
        .await
        .unwrap();

    let names: Vec<_> = summary.relays.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "bravo", "core"]);
    assert_eq!(summary.relays_total, 3);
    assert_eq!(summary.relays_active, 2);
    assert_eq!(summary.tenants_active, 2);
    assert_eq!(summary.total_peers, 1);
    assert_eq!(summary.bandwidth_aggregated_mb, 1.0);
    assert_eq!(summary.global_health_score, 66.7);
}

#[tokio::test]
async fn test_tenant_summary_is_isolated() {
    let fleet = fleet().await;
    let summary = fleet
        .monitor
        .summary(&CallerScope::new("engineer", Some(fleet.acme)))
        .await
        .unwrap();

    assert_eq!(summary.relays_total, 1);
    assert_eq!(summary.relays[0].id, fleet.alpha);
    assert_eq!(summary.tenants_active, 1);
    assert_eq!(summary.global_health_score, 100.0);
}

#[tokio::test]
async fn test_scoped_role_without_tenant_is_rejected() {
    let fleet = fleet().await;
    let result = fleet
        .monitor
        .summary(&CallerScope::new("viewer", None))
        .await;
    assert!(matches!(
        result,
        Err(MonitorError::Scope(ScopeError::MissingTenant(_)))
    ));
}

#[tokio::test]
async fn test_alerts_follow_scope() {
    let fleet = fleet().await;

    let global = fleet
        .monitor
        .alerts(&CallerScope::new("admin", None))
        .await
        .unwrap();
    let down: Vec<_> = global
        .alerts
        .iter()
        .filter(|a| a.kind == AlertKind::RelayDown)
        .collect();
    assert_eq!(down.len(), 1);
    assert_eq!(down[0].severity, Severity::Critical);
    assert_eq!(down[0].message, "Relay core is not running (status: stopped)");
    assert!(global
        .alerts
        .iter()
        .any(|a| a.message == "Tenant acme uses 1/1 relays"));

    let globex = fleet
        .monitor
        .alerts(&CallerScope::new("viewer", Some(fleet.globex)))
        .await
        .unwrap();
    assert_eq!(globex.total, 0);
}

#[tokio::test]
async fn test_topology_drops_cross_tenant_edges() {
    let fleet = fleet().await;

    let acme = fleet
        .monitor
        .topology(&CallerScope::new("engineer", Some(fleet.acme)))
        .await
        .unwrap();
    assert_eq!(acme.nodes.len(), 2);
    assert_eq!(acme.edges.len(), 1);
    assert_eq!(acme.edges[0].id, edge_id(fleet.key_a, fleet.alpha));
    assert_eq!(acme.edges[0].status, EdgeStatus::Active);

    let global = fleet
        .monitor
        .topology(&CallerScope::new("admin", None))
        .await
        .unwrap();
    assert_eq!(global.nodes.len(), 5);
    let edges: Vec<_> = global
        .edges
        .iter()
        .map(|e| (e.id.clone(), e.status))
        .collect();
    // One live peer on alpha: only the first assigned key is active
    assert_eq!(
        edges,
        vec![
            (edge_id(fleet.key_a, fleet.alpha), EdgeStatus::Active),
            (edge_id(fleet.key_b, fleet.alpha), EdgeStatus::Down),
            (edge_id(fleet.key_b, fleet.bravo), EdgeStatus::Down),
        ]
    );
}

#[tokio::test]
async fn test_relay_health_authorization() {
    let fleet = fleet().await;
    let acme = CallerScope::new("engineer", Some(fleet.acme));

    let report = fleet.monitor.relay_health(&acme, fleet.alpha).await.unwrap();
    assert_eq!(report.relay_name, "alpha");
    assert_eq!(report.health_score, 100.0);
    assert!(report.stats_available);

    assert!(matches!(
        fleet.monitor.relay_health(&acme, fleet.bravo).await,
        Err(MonitorError::Scope(ScopeError::ForeignTenant))
    ));
    assert!(matches!(
        fleet.monitor.relay_health(&acme, 9999).await,
        Err(MonitorError::RelayNotFound(9999))
    ));
}

#[tokio::test]
async fn test_relay_stats_proxy() {
    let fleet = fleet().await;
    let admin = CallerScope::new("admin", None);

    let (relay, doc) = fleet.monitor.relay_stats(&admin, fleet.alpha).await.unwrap();
    assert_eq!(relay.name, "alpha");
    assert_eq!(doc.unwrap()["total_handshakes"], 20);

    let (_, doc) = fleet.monitor.relay_stats(&admin, fleet.bravo).await.unwrap();
    assert!(doc.is_none());
}

#[tokio::test]
async fn test_tenant_usage() {
    let fleet = fleet().await;

    let usage = fleet
        .monitor
        .tenant_usage(&CallerScope::new("admin", None), fleet.acme)
        .await
        .unwrap();
    assert_eq!(usage.used_relays, 1);
    assert_eq!(usage.usage_pct, 100.0);
    assert!(usage.soft_quota_warning);

    assert!(matches!(
        fleet
            .monitor
            .tenant_usage(&CallerScope::new("engineer", Some(fleet.acme)), fleet.globex)
            .await,
        Err(MonitorError::Scope(ScopeError::ForeignTenant))
    ));
    assert!(matches!(
        fleet
            .monitor
            .tenant_usage(&CallerScope::new("admin", None), 777)
            .await,
        Err(MonitorError::TenantNotFound(777))
    ));
}
