//! Relay provisioning tests against a real SQLite store and a fake orchestrator

mod common;

use common::*;
use relaydeck_control::{CreateRelay, ProvisionError, RelayProvisioner, FIRST_WEB_PORT};
use relaydeck_orchestrator::OrchestratorBackend;
use relaydeck_proto::{CallerScope, RelayStatus, ScopeError};
use relaydeck_auth::KeyCipher;
use relaydeck_relay_db::entities::{access_key, relay};
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
use std::sync::Arc;

fn request(name: &str, udp_port: i32, key_ids: Vec<i32>) -> CreateRelay {
    CreateRelay {
        name: name.to_string(),
        udp_port,
        key_ids,
        tenant_id: None,
        region: "eu-west".to_string(),
        description: String::new(),
    }
}

fn admin() -> CallerScope {
    CallerScope::new("admin", None)
}

#[tokio::test]
async fn test_create_assigns_ports_and_deploys() {
    let db = setup_test_db().await;
    let k1 = insert_key(&db, "hq", None).await;
    let k2 = insert_key(&db, "lab", None).await;

    let orchestrator = Arc::new(FakeOrchestrator::default());
    let provisioner = RelayProvisioner::new(db.clone(), orchestrator.clone(), test_cipher());

    let first = provisioner
        .create(&admin(), request("Milan Edge", 51820, vec![k2.id, k1.id, k2.id]))
        .await
        .unwrap();
    assert_eq!(first.name, "milan-edge");
    assert_eq!(first.web_port, FIRST_WEB_PORT);
    assert!(first.warning.is_none());

    let second = provisioner
        .create(&admin(), request("core", 51821, vec![]))
        .await
        .unwrap();
    assert_eq!(second.web_port, FIRST_WEB_PORT + 1);

    let deployed = orchestrator.deployed.lock().unwrap().clone();
    assert_eq!(deployed.len(), 2);
    assert_eq!(deployed[0].relay_name, "milan-edge");
    assert_eq!(deployed[0].udp_port, 51820);
    assert_eq!(deployed[0].allowed_keys, vec!["lab-secret", "hq-secret"]);
    assert!(deployed[1].allowed_keys.is_empty());

    let listing = provisioner.list(&admin()).await.unwrap();
    let names: Vec<_> = listing.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["core", "milan-edge"]);
    let aliases: Vec<_> = listing[1].keys.iter().map(|k| k.alias.as_str()).collect();
    assert_eq!(aliases, vec!["lab", "hq"]);
    assert_eq!(listing[1].status, RelayStatus::Running);
}

#[tokio::test]
async fn test_engineer_creates_in_own_tenant() {
    let db = setup_test_db().await;
    let acme = insert_tenant(&db, "acme", 5).await;
    let globex = insert_tenant(&db, "globex", 5).await;
    let own_key = insert_key(&db, "acme-hq", Some(acme.id)).await;
    let foreign_key = insert_key(&db, "globex-lab", Some(globex.id)).await;

    let provisioner = RelayProvisioner::new(db.clone(), Arc::new(FakeOrchestrator::default()), test_cipher());
    let engineer = CallerScope::new("engineer", Some(acme.id));

    let mut req = request("edge", 51820, vec![own_key.id]);
    req.tenant_id = Some(globex.id);
    let outcome = provisioner.create(&engineer, req).await.unwrap();

    let stored = relay::Entity::find_by_id(outcome.relay_id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.tenant_id, Some(acme.id));

    let result = provisioner
        .create(&engineer, request("edge-2", 51821, vec![foreign_key.id]))
        .await;
    assert!(matches!(
        result,
        Err(ProvisionError::Scope(ScopeError::ForeignTenant))
    ));
    assert_eq!(relay::Entity::find().count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn test_create_rejections() {
    let db = setup_test_db().await;
    let provisioner = RelayProvisioner::new(db.clone(), Arc::new(FakeOrchestrator::default()), test_cipher());

    assert!(matches!(
        provisioner
            .create(&CallerScope::new("viewer", Some(1)), request("edge", 51820, vec![]))
            .await,
        Err(ProvisionError::Scope(ScopeError::ReadOnly(_)))
    ));
    assert!(matches!(
        provisioner
            .create(&CallerScope::new("executive", None), request("edge", 51820, vec![]))
            .await,
        Err(ProvisionError::Scope(ScopeError::ReadOnly(_)))
    ));
    for name in ["  ", "edge/../x", "edge?force=true", "edge#1", "édge_1"] {
        assert!(matches!(
            provisioner.create(&admin(), request(name, 51820, vec![])).await,
            Err(ProvisionError::InvalidName(_))
        ));
    }
    assert!(matches!(
        provisioner
            .create(&admin(), request(&"x".repeat(60), 51820, vec![]))
            .await,
        Err(ProvisionError::InvalidName(_))
    ));
    assert!(matches!(
        provisioner.create(&admin(), request("edge", 70000, vec![])).await,
        Err(ProvisionError::InvalidPort(70000))
    ));
    assert!(matches!(
        provisioner.create(&admin(), request("edge", 51820, vec![42])).await,
        Err(ProvisionError::UnknownKey(42))
    ));
    assert_eq!(relay::Entity::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_deploy_failure_keeps_record() {
    let db = setup_test_db().await;
    let provisioner = RelayProvisioner::new(
        db.clone(),
        Arc::new(FakeOrchestrator::default().failing_deploys()),
        test_cipher(),
    );

    let outcome = provisioner
        .create(&admin(), request("edge", 51820, vec![]))
        .await
        .unwrap();
    assert!(outcome.warning.unwrap().contains("daemon socket missing"));
    assert_eq!(relay::Entity::find().count(&db).await.unwrap(), 1);

    let listing = provisioner.list(&admin()).await.unwrap();
    assert_eq!(listing[0].status, RelayStatus::NotCreated);
}

#[tokio::test]
async fn test_replace_keys_redeploys() {
    let db = setup_test_db().await;
    let k1 = insert_key(&db, "hq", None).await;
    let k2 = insert_key(&db, "lab", None).await;

    let orchestrator = Arc::new(FakeOrchestrator::default());
    let provisioner = RelayProvisioner::new(db.clone(), orchestrator.clone(), test_cipher());
    let created = provisioner
        .create(&admin(), request("edge", 51820, vec![k1.id]))
        .await
        .unwrap();

    provisioner
        .replace_keys(&admin(), created.relay_id, &[k2.id])
        .await
        .unwrap();

    let deployed = orchestrator.deployed.lock().unwrap().clone();
    assert_eq!(deployed.len(), 2);
    assert_eq!(deployed[1].allowed_keys, vec!["lab-secret"]);

    let listing = provisioner.list(&admin()).await.unwrap();
    let aliases: Vec<_> = listing[0].keys.iter().map(|k| k.alias.as_str()).collect();
    assert_eq!(aliases, vec!["lab"]);
}

#[tokio::test]
async fn test_lifecycle_and_delete() {
    let db = setup_test_db().await;
    let acme = insert_tenant(&db, "acme", 5).await;

    let orchestrator = Arc::new(FakeOrchestrator::default());
    let provisioner = RelayProvisioner::new(db.clone(), orchestrator.clone(), test_cipher());
    let created = provisioner
        .create(&admin(), request("edge", 51820, vec![]))
        .await
        .unwrap();

    provisioner.stop(&admin(), created.relay_id).await.unwrap();
    assert_eq!(
        orchestrator.status("edge").await.status,
        RelayStatus::Other("exited".to_string())
    );
    provisioner.start(&admin(), created.relay_id).await.unwrap();
    assert!(orchestrator.status("edge").await.status.is_running());

    let lines = provisioner.logs(&admin(), created.relay_id, 3).await.unwrap();
    assert_eq!(lines, vec!["edge line 48", "edge line 49", "edge line 50"]);

    // Global relay is invisible to a tenant engineer
    assert!(matches!(
        provisioner
            .delete(&CallerScope::new("engineer", Some(acme.id)), created.relay_id)
            .await,
        Err(ProvisionError::Scope(ScopeError::ForeignTenant))
    ));

    let name = provisioner.delete(&admin(), created.relay_id).await.unwrap();
    assert_eq!(name, "edge");
    assert_eq!(*orchestrator.removed.lock().unwrap(), vec!["edge".to_string()]);
    assert_eq!(relay::Entity::find().count(&db).await.unwrap(), 0);

    assert!(matches!(
        provisioner.delete(&admin(), created.relay_id).await,
        Err(ProvisionError::RelayNotFound(_))
    ));
}

#[tokio::test]
async fn test_key_material_is_sealed_at_rest() {
    let db = setup_test_db().await;
    let key = insert_key(&db, "hq", None).await;
    assert!(KeyCipher::is_sealed(&key.key_value));
    assert!(!key.key_value.contains("hq-secret"));

    let orchestrator = Arc::new(FakeOrchestrator::default());
    let provisioner = RelayProvisioner::new(db.clone(), orchestrator.clone(), test_cipher());
    provisioner
        .create(&admin(), request("edge", 51820, vec![key.id]))
        .await
        .unwrap();

    let deployed = orchestrator.deployed.lock().unwrap().clone();
    assert_eq!(deployed[0].allowed_keys, vec!["hq-secret"]);
}

#[tokio::test]
async fn test_unreadable_key_material_blocks_create() {
    let db = setup_test_db().await;
    let legacy = access_key::ActiveModel {
        alias: Set("legacy".to_string()),
        key_value: Set("stored-in-the-clear".to_string()),
        tenant_id: Set(None),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(&db)
    .await
    .unwrap();

    let orchestrator = Arc::new(FakeOrchestrator::default());
    let provisioner = RelayProvisioner::new(db.clone(), orchestrator.clone(), test_cipher());
    let result = provisioner
        .create(&admin(), request("edge", 51820, vec![legacy.id]))
        .await;

    assert!(matches!(
        result,
        Err(ProvisionError::KeyMaterial { ref alias, .. }) if alias == "legacy"
    ));
    assert_eq!(relay::Entity::find().count(&db).await.unwrap(), 0);
    assert!(orchestrator.deployed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_restart_and_details() {
    let db = setup_test_db().await;
    let acme = insert_tenant(&db, "acme", 5).await;

    let orchestrator = Arc::new(FakeOrchestrator::default());
    let provisioner = RelayProvisioner::new(db.clone(), orchestrator.clone(), test_cipher());
    let created = provisioner
        .create(&admin(), request("edge", 51820, vec![]))
        .await
        .unwrap();

    provisioner.stop(&admin(), created.relay_id).await.unwrap();
    provisioner.restart(&admin(), created.relay_id).await.unwrap();
    let details = provisioner.details(&admin(), created.relay_id).await.unwrap();
    assert_eq!(details.status, RelayStatus::Running);

    assert!(matches!(
        provisioner
            .restart(&CallerScope::new("executive", None), created.relay_id)
            .await,
        Err(ProvisionError::Scope(ScopeError::ReadOnly(_)))
    ));
    assert!(matches!(
        provisioner
            .details(&CallerScope::new("viewer", Some(acme.id)), created.relay_id)
            .await,
        Err(ProvisionError::Scope(ScopeError::ForeignTenant))
    ));
}
