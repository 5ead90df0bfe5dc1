//! Integration tests for the HTTP surface

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use relaydeck_api::{models::*, ApiServer, ApiServerConfig};
use relaydeck_auth::{JwtClaims, JwtValidator, KeyCipher};
use relaydeck_control::{
    DatabaseFleetSource, Evaluator, EvaluatorConfig, FleetMonitor, HealthScorer, KeyStore,
    MonitoringPoller, RelayProvisioner, StatsProvider, TenantStore, ZabbixSender,
};
use relaydeck_orchestrator::{
    OrchestratorBackend, OrchestratorError, OrchestratorKind, RelayDeployment,
};
use relaydeck_proto::{OrchestratorSnapshot, RelayStatus};
use relaydeck_relay_db::entities::{relay, tenant};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method

const SECRET: &str = "test-secret";

/// Every workload is running with two restarts
struct StaticOrchestrator;

#[async_trait]
impl OrchestratorBackend for StaticOrchestrator {
    fn kind(&self) -> OrchestratorKind {
        OrchestratorKind::Docker
    }

    async fn inspect(&self, _: &str) -> Result<OrchestratorSnapshot, OrchestratorError> {
        Ok(OrchestratorSnapshot::new(RelayStatus::Running, 2))
    }

    async fn deploy(&self, _: &RelayDeployment) -> Result<(), OrchestratorError> {
        Ok(())
    }

    async fn remove(&self, _: &str) -> Result<(), OrchestratorError> {
        Ok(())
    }

    async fn start(&self, _: &str) -> Result<(), OrchestratorError> {
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), OrchestratorError> {
        Err(OrchestratorError::Unavailable(format!("cannot reach {}", name)))
    }

    async fn logs(&self, name: &str, tail: usize) -> Result<Vec<String>, OrchestratorError> {
        Ok((0..tail).map(|i| format!("{} #{}", name, i)).collect())
    }
}

/// Only `alpha` answers with stats
struct AlphaStats;

#[async_trait]
impl StatsProvider for AlphaStats {
    async fn fetch_document(&self, relay_name: &str) -> Option<Value> {
        (relay_name == "alpha").then(|| {
            json!({
                "total_handshakes": 10,
                "successful_handshakes": 10,
                "peers": {"p1": {"status": 1}}
            })
        })
    }
}

async fn create_test_db() -> DatabaseConnection {
    let db = relaydeck_relay_db::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    relaydeck_relay_db::migrate(&db)
        .await
        .expect("Failed to run migrations");
    db
}

async fn insert_tenant(db: &DatabaseConnection, name: &str) -> i32 {
    tenant::ActiveModel {
        name: Set(name.to_string()),
        slug: Set(name.to_string()),
        max_relays: Set(4),
        max_bandwidth_mbps: Set(100),
        sla_target: Set(99.0),
        allowed_regions: Set("[]".to_string()),
        preferred_relay_ids: Set("[]".to_string()),
        api_key: Set(format!("api-{}", name)),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
    .id
}

async fn insert_relay(db: &DatabaseConnection, name: &str, port: i32, tenant_id: Option<i32>) -> i32 {
    relay::ActiveModel {
        name: Set(name.to_string()),
        udp_port: Set(port),
        web_port: Set(port - 40000),
        tenant_id: Set(tenant_id),
        region: Set("eu-west".to_string()),
        description: Set(String::new()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
    .id
}

struct TestApp {
    router: Router,
    acme: i32,
    globex: i32,
    alpha: i32,
    bravo: i32,
}

fn evaluator(orchestrator: Arc<dyn OrchestratorBackend>) -> Evaluator {
    Evaluator::new(
        orchestrator,
        Arc::new(AlphaStats),
        HealthScorer::default(),
        EvaluatorConfig::default(),
    )
}

async fn create_test_app() -> TestApp {
    build_test_app(false).await
}

/// With `monitoring`, the poller pushes to a closed port so every push fails
async fn build_test_app(monitoring: bool) -> TestApp {
    let db = create_test_db().await;
    let acme = insert_tenant(&db, "acme").await;
    let globex = insert_tenant(&db, "globex").await;
    let alpha = insert_relay(&db, "alpha", 48080, Some(acme)).await;
    let bravo = insert_relay(&db, "bravo", 48081, Some(globex)).await;

    let orchestrator: Arc<dyn OrchestratorBackend> = Arc::new(StaticOrchestrator);
    let source = Arc::new(DatabaseFleetSource::new(db.clone()));
    let monitor = FleetMonitor::new(source.clone(), evaluator(orchestrator.clone()));
    let cipher = Arc::new(KeyCipher::new(&[3u8; 32]).unwrap());
    let provisioner = RelayProvisioner::new(db.clone(), orchestrator.clone(), cipher.clone());
    let keys = KeyStore::new(db.clone(), cipher);
    let tenants = TenantStore::new(db);
    let poller = monitoring.then(|| {
        Arc::new(MonitoringPoller::new(
            source,
            evaluator(orchestrator),
            ZabbixSender::new("127.0.0.1:1"),
        ))
    });

    let config = ApiServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        enable_cors: true,
        cors_origins: None,
        jwt_secret: SECRET.to_string(),
        jwt_issuer: None,
    };
    let server = ApiServer::new(config, monitor, provisioner, keys, tenants, poller);

    TestApp {
        router: server.build_router(),
        acme,
        globex,
        alpha,
        bravo,
    }
}

fn token(role: &str, tenant: Option<i32>) -> String {
    let mut claims = JwtClaims::new(
        "tester".to_string(),
        "relaydeck".to_string(),
        role.to_string(),
        Duration::hours(1),
    );
    if let Some(tenant) = tenant {
        claims = claims.with_tenant(tenant);
    }
    JwtValidator::encode(SECRET.as_bytes(), &claims).unwrap()
}

async fn call(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().uri(uri).method(method);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_is_public() {
    let app = create_test_app().await;
    let (status, body) = call(&app, "GET", "/api/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_value(body).unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.orchestrator, "docker");
    assert!(!health.monitoring_enabled);
}

#[tokio::test]
async fn test_dashboard_requires_auth() {
    let app = create_test_app().await;
    let (status, body) = call(&app, "GET", "/api/dashboard/kpi", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "MISSING_AUTH");
}

#[tokio::test]
async fn test_kpi_scoping() {
    let app = create_test_app().await;

    let (status, body) = call(&app, "GET", "/api/dashboard/kpi", Some(&token("admin", None)), None).await;
    assert_eq!(status, StatusCode::OK);
    let summary: FleetSummary = serde_json::from_value(body).unwrap();
    assert_eq!(summary.relays_total, 2);
    assert_eq!(summary.tenants_active, 2);

    let engineer = token("engineer", Some(app.acme));
    let (_, body) = call(&app, "GET", "/api/dashboard/kpi", Some(&engineer), None).await;
    let summary: FleetSummary = serde_json::from_value(body).unwrap();
    assert_eq!(summary.relays_total, 1);
    assert_eq!(summary.relays[0].name, "alpha");

    let (status, body) = call(&app, "GET", "/api/dashboard/alerts", Some(&token("viewer", None)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_topology_and_alerts() {
    let app = create_test_app().await;
    let admin = token("admin", None);

    let (status, body) = call(&app, "GET", "/api/dashboard/topology", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status_source"], "peer_count_approximation");
    assert_eq!(body["nodes"].as_array().unwrap().len(), 2);

    let (status, body) = call(&app, "GET", "/api/dashboard/alerts", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let report: AlertReport = serde_json::from_value(body).unwrap();
    assert_eq!(report.total, 0);
}

#[tokio::test]
async fn test_relay_health_endpoint() {
    let app = create_test_app().await;
    let engineer = token("engineer", Some(app.acme));

    let (status, body) = call(&app, "GET", &format!("/api/relays/{}/health", app.alpha), Some(&engineer), None).await;
    assert_eq!(status, StatusCode::OK);
    let report: RelayHealthReport = serde_json::from_value(body).unwrap();
    assert!(report.stats_available);
    assert_eq!(report.orchestrator.restart_count, 2);
    // 0.20*100 + 0.15*80 + 0.35*100 + 0.30*100
    assert_eq!(report.health_score, 97.0);

    let (status, _) = call(&app, "GET", &format!("/api/relays/{}/health", app.bravo), Some(&engineer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, "GET", "/api/relays/4040/health", Some(&engineer), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "RELAY_NOT_FOUND");
}

#[tokio::test]
async fn test_stats_proxy_reports_unavailable() {
    let app = create_test_app().await;
    let admin = token("admin", None);

    let (status, body) = call(&app, "GET", &format!("/api/relays/{}/stats", app.alpha), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_handshakes"], 10);

    let (status, body) = call(&app, "GET", &format!("/api/relays/{}/stats", app.bravo), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"error": "stats unavailable", "relay": "bravo"}));
}

#[tokio::test]
async fn test_relay_lifecycle_over_http() {
    let app = create_test_app().await;
    let admin = token("admin", None);

    let (status, body) = call(
        &app,
        "POST",
        "/api/relays",
        Some(&token("viewer", Some(app.acme))),
        Some(json!({"name": "edge", "udp_port": 51820})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, body) = call(
        &app,
        "POST",
        "/api/relays",
        Some(&admin),
        Some(json!({"name": "Paris Edge", "udp_port": 51820, "tenant_id": app.globex})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: RelayWriteResponse = serde_json::from_value(body).unwrap();
    assert_eq!(created.name, "paris-edge");
    assert_eq!(created.web_port, 8082);
    assert!(created.warning.is_none());

    let (status, body) = call(
        &app,
        "POST",
        "/api/relays",
        Some(&admin),
        Some(json!({"name": "paris edge", "udp_port": 51821})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "RELAY_CONFLICT");

    let (status, body) = call(&app, "GET", "/api/relays", Some(&token("engineer", Some(app.globex))), None).await;
    assert_eq!(status, StatusCode::OK);
    let list: RelayList = serde_json::from_value(body).unwrap();
    let names: Vec<_> = list.relays.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["bravo", "paris-edge"]);

    let (status, body) = call(&app, "GET", &format!("/api/relays/{}/logs?tail=2", created.id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let logs: RelayLogs = serde_json::from_value(body).unwrap();
    assert_eq!(logs.lines.len(), 2);

    let (status, body) = call(&app, "POST", &format!("/api/relays/{}/stop", created.id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "ORCHESTRATOR_ERROR");

    let (status, _) = call(&app, "POST", &format!("/api/relays/{}/start", created.id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app,
        "PUT",
        &format!("/api/relays/{}/keys", created.id),
        Some(&admin),
        Some(json!({"key_ids": [99]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "KEY_NOT_FOUND");

    let (status, _) = call(&app, "DELETE", &format!("/api/relays/{}", created.id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "DELETE", &format!("/api/relays/{}", created.id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tenant_usage_endpoint() {
    let app = create_test_app().await;

    let (status, body) = call(
        &app,
        "GET",
        &format!("/api/tenants/{}/usage", app.acme),
        Some(&token("engineer", Some(app.acme))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let usage: TenantUsage = serde_json::from_value(body).unwrap();
    assert_eq!(usage.used_relays, 1);
    assert_eq!(usage.usage_pct, 25.0);
    assert!(!usage.soft_quota_warning);

    let (status, _) = call(
        &app,
        "GET",
        &format!("/api/tenants/{}/usage", app.globex),
        Some(&token("engineer", Some(app.acme))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_monitoring_disabled() {
    let app = create_test_app().await;
    let admin = token("admin", None);

    let (status, body) = call(&app, "GET", "/api/monitoring/sync", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "MONITORING_DISABLED");

    let (status, _) = call(&app, "POST", "/api/monitoring/sync", Some(&token("engineer", Some(app.acme))), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_sync_report_is_fleet_wide_only() {
    let app = build_test_app(true).await;
    let admin = token("admin", None);

    let (status, body) = call(&app, "POST", "/api/monitoring/sync", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let report: SyncReport = serde_json::from_value(body).unwrap();
    assert_eq!(report.status, SyncStatus::Partial);
    assert!(report.errors[0].starts_with("wpex-alpha"));

    // The report names acme's relay, so no tenant-scoped role may read it
    for role in ["engineer", "viewer"] {
        let caller = token(role, Some(app.globex));
        let (status, body) = call(&app, "GET", "/api/monitoring/sync", Some(&caller), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");
        assert!(!body.to_string().contains("wpex-alpha"));
    }

    for role in ["admin", "executive"] {
        let (status, body) = call(&app, "GET", "/api/monitoring/sync", Some(&token(role, None)), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["errors"][0].as_str().map(|e| e.starts_with("wpex-alpha")), Some(true));
    }
}

#[tokio::test]
async fn test_relay_names_must_be_dns_labels() {
    let app = create_test_app().await;
    let admin = token("admin", None);

    let too_long = "x".repeat(59);
    for name in ["edge/../x", "edge?force=true", "edge#1", "édge_1", too_long.as_str()] {
        let (status, body) = call(
            &app,
            "POST",
            "/api/relays",
            Some(&admin),
            Some(json!({"name": name, "udp_port": 51820})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{name:?}");
        assert_eq!(body["code"], "INVALID_REQUEST");
    }

    let (_, body) = call(&app, "GET", "/api/relays", Some(&admin), None).await;
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn test_restart_and_container_endpoints() {
    let app = create_test_app().await;
    let engineer = token("engineer", Some(app.acme));

    let (status, body) = call(&app, "GET", &format!("/api/relays/{}/container", app.alpha), Some(&engineer), None).await;
    assert_eq!(status, StatusCode::OK);
    let details: WorkloadDetails = serde_json::from_value(body).unwrap();
    assert_eq!(details.status, RelayStatus::Running);
    assert_eq!(details.restart_count, 2);

    let (status, _) = call(&app, "GET", &format!("/api/relays/{}/container", app.bravo), Some(&engineer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Default restart is stop then start; this backend cannot stop
    let (status, body) = call(&app, "POST", &format!("/api/relays/{}/restart", app.alpha), Some(&engineer), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "ORCHESTRATOR_ERROR");

    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/relays/{}/restart", app.alpha),
        Some(&token("viewer", Some(app.acme))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_keys_endpoints() {
    let app = create_test_app().await;
    let engineer = token("engineer", Some(app.acme));

    let (status, body) = call(
        &app,
        "POST",
        "/api/keys",
        Some(&engineer),
        Some(json!({"alias": "acme-hq", "key_value": "very-secret", "tenant_id": app.globex})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(!body.to_string().contains("very-secret"));
    let key: AccessKeyInfo = serde_json::from_value(body).unwrap();
    assert_eq!(key.tenant_id, Some(app.acme));

    let (status, body) = call(&app, "GET", "/api/keys", Some(&token("admin", None)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert!(!body.to_string().contains("very-secret"));

    let (_, body) = call(&app, "GET", "/api/keys", Some(&token("engineer", Some(app.globex))), None).await;
    assert_eq!(body["total"], 0);

    let (status, _) = call(&app, "DELETE", &format!("/api/keys/{}", key.id), Some(&token("engineer", Some(app.globex))), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, "POST", "/api/keys", Some(&engineer), Some(json!({"alias": "", "key_value": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");

    let (status, _) = call(&app, "DELETE", &format!("/api/keys/{}", key.id), Some(&engineer), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&app, "DELETE", &format!("/api/keys/{}", key.id), Some(&engineer), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "KEY_NOT_FOUND");
}

#[tokio::test]
async fn test_tenants_endpoints() {
    let app = create_test_app().await;
    let admin = token("admin", None);
    let engineer = token("engineer", Some(app.acme));

    let (status, body) = call(&app, "GET", "/api/tenants", Some(&engineer), None).await;
    assert_eq!(status, StatusCode::OK);
    let list: TenantList = serde_json::from_value(body).unwrap();
    assert_eq!(list.total, 1);
    assert_eq!(list.tenants[0].name, "acme");
    assert_eq!(list.tenants[0].used_relays, 1);

    let (status, _) = call(&app, "GET", &format!("/api/tenants/{}", app.globex), Some(&engineer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = call(&app, "GET", "/api/tenants/999", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TENANT_NOT_FOUND");

    let (status, _) = call(&app, "POST", "/api/tenants", Some(&engineer), Some(json!({"name": "Initech", "slug": "initech"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, "POST", "/api/tenants", Some(&admin), Some(json!({"name": "Initech", "slug": "Initech EU"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let created: TenantCreated = serde_json::from_value(body).unwrap();
    assert_eq!(created.tenant.slug, "initech-eu");
    assert_eq!(created.tenant.max_relays, 10);
    assert!(!created.api_key.is_empty());

    let (status, body) = call(&app, "POST", "/api/tenants", Some(&admin), Some(json!({"name": "Initech", "slug": "other"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "TENANT_CONFLICT");

    let uri = format!("/api/tenants/{}", created.tenant.id);
    let (status, body) = call(&app, "PUT", &uri, Some(&admin), Some(json!({"sla_target": 99.5}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sla_target"], 99.5);
    let (status, _) = call(&app, "PUT", &uri, Some(&token("executive", None)), Some(json!({"is_active": false}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, "DELETE", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "GET", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
