//! Shared fakes and fixtures for control plane integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use relaydeck_auth::KeyCipher;
use relaydeck_control::StatsProvider;
use relaydeck_orchestrator::{
    OrchestratorBackend, OrchestratorError, OrchestratorKind, RelayDeployment,
};
use relaydeck_proto::{OrchestratorSnapshot, RelayStatus};
use relaydeck_relay_db::entities::{access_key, relay, relay_key_link, tenant};
use relaydeck_relay_db::{connect, migrate};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory orchestrator keyed by relay name
#[derive(Default)]
pub struct FakeOrchestrator {
    pub snapshots: Mutex<HashMap<String, OrchestratorSnapshot>>,
    pub delays: HashMap<String, Duration>,
    pub deployed: Mutex<Vec<RelayDeployment>>,
    pub removed: Mutex<Vec<String>>,
    pub fail_deploy: bool,
}

impl FakeOrchestrator {
    pub fn with_status(self, name: &str, status: RelayStatus, restarts: u32) -> Self {
        self.snapshots
            .lock()
            .unwrap()
            .insert(name.to_string(), OrchestratorSnapshot::new(status, restarts));
        self
    }

    pub fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    pub fn failing_deploys(mut self) -> Self {
        self.fail_deploy = true;
        self
    }
}

#[async_trait]
impl OrchestratorBackend for FakeOrchestrator {
    fn kind(&self) -> OrchestratorKind {
        OrchestratorKind::Docker
    }

    async fn inspect(&self, relay_name: &str) -> Result<OrchestratorSnapshot, OrchestratorError> {
        if let Some(delay) = self.delays.get(relay_name) {
            tokio::time::sleep(*delay).await;
        }
        let snapshot = self.snapshots.lock().unwrap().get(relay_name).cloned();
        Ok(snapshot.unwrap_or_else(OrchestratorSnapshot::not_created))
    }

    async fn deploy(&self, deployment: &RelayDeployment) -> Result<(), OrchestratorError> {
        if self.fail_deploy {
            return Err(OrchestratorError::Unavailable("daemon socket missing".to_string()));
        }
        self.deployed.lock().unwrap().push(deployment.clone());
        self.snapshots.lock().unwrap().insert(
            deployment.relay_name.clone(),
            OrchestratorSnapshot::new(RelayStatus::Running, 0),
        );
        Ok(())
    }

    async fn remove(&self, relay_name: &str) -> Result<(), OrchestratorError> {
        self.removed.lock().unwrap().push(relay_name.to_string());
        self.snapshots.lock().unwrap().remove(relay_name);
        Ok(())
    }

    async fn start(&self, relay_name: &str) -> Result<(), OrchestratorError> {
        let mut snapshots = self.snapshots.lock().unwrap();
        let snapshot = snapshots
            .get_mut(relay_name)
            .ok_or_else(|| OrchestratorError::NotFound(relay_name.to_string()))?;
        snapshot.status = RelayStatus::Running;
        Ok(())
    }

    async fn stop(&self, relay_name: &str) -> Result<(), OrchestratorError> {
        let mut snapshots = self.snapshots.lock().unwrap();
        let snapshot = snapshots
            .get_mut(relay_name)
            .ok_or_else(|| OrchestratorError::NotFound(relay_name.to_string()))?;
        snapshot.status = RelayStatus::Other("exited".to_string());
        Ok(())
    }

    async fn logs(&self, relay_name: &str, tail: usize) -> Result<Vec<String>, OrchestratorError> {
        let lines: Vec<String> = (1..=50).map(|i| format!("{} line {}", relay_name, i)).collect();
        Ok(lines[lines.len().saturating_sub(tail)..].to_vec())
    }
}

/// Stats documents keyed by relay name
#[derive(Default)]
pub struct FakeStats {
    pub docs: HashMap<String, Value>,
    pub delays: HashMap<String, Duration>,
}

impl FakeStats {
    pub fn with_doc(mut self, name: &str, doc: Value) -> Self {
        self.docs.insert(name.to_string(), doc);
        self
    }

    pub fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }
}

#[async_trait]
impl StatsProvider for FakeStats {
    async fn fetch_document(&self, relay_name: &str) -> Option<Value> {
        if let Some(delay) = self.delays.get(relay_name) {
            tokio::time::sleep(*delay).await;
        }
        self.docs.get(relay_name).cloned()
    }
}

/// Cipher under a fixed test key; `insert_key` seals with the same key
pub fn test_cipher() -> Arc<KeyCipher> {
    Arc::new(KeyCipher::new(&[7u8; 32]).expect("valid test key"))
}

pub async fn setup_test_db() -> DatabaseConnection {
    let db = connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");
    migrate(&db).await.expect("Failed to run migrations");
    db
}

pub async fn insert_tenant(db: &DatabaseConnection, name: &str, max_relays: i32) -> tenant::Model {
    tenant::ActiveModel {
        name: Set(name.to_string()),
        slug: Set(name.to_lowercase()),
        max_relays: Set(max_relays),
        max_bandwidth_mbps: Set(100),
        sla_target: Set(99.5),
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
    .expect("Failed to insert tenant")
}

pub async fn insert_relay(
    db: &DatabaseConnection,
    name: &str,
    udp_port: i32,
    tenant_id: Option<i32>,
) -> relay::Model {
    relay::ActiveModel {
        name: Set(name.to_string()),
        udp_port: Set(udp_port),
        web_port: Set(udp_port - 40000 + 8080),
        tenant_id: Set(tenant_id),
        region: Set("eu-west".to_string()),
        description: Set(String::new()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert relay")
}

pub async fn insert_key(
    db: &DatabaseConnection,
    alias: &str,
    tenant_id: Option<i32>,
) -> access_key::Model {
    access_key::ActiveModel {
        alias: Set(alias.to_string()),
        key_value: Set(test_cipher()
            .encrypt(&format!("{}-secret", alias))
            .expect("Failed to seal key")),
        tenant_id: Set(tenant_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert key")
}

pub async fn link(db: &DatabaseConnection, relay_id: i32, key_id: i32, position: i32) {
    relay_key_link::ActiveModel {
        relay_id: Set(relay_id),
        key_id: Set(key_id),
        position: Set(position),
        assigned_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("Failed to link key");
}
