//! Relay lifecycle: create, re-key, start/stop, delete and log access
//!
//! Database writes happen first; the workload is (re)deployed afterwards
//! and a deployment failure is reported as a warning with the record kept.

use futures::future::join_all;
use relaydeck_auth::{CipherError, KeyCipher};
use relaydeck_orchestrator::{
    OrchestratorBackend, OrchestratorError, OrchestratorKind, RelayDeployment,
    DEFAULT_NAME_PREFIX,
};
use relaydeck_proto::{
    CallerScope, FleetScope, KeyAlias, OrchestratorSnapshot, RelayListing, ScopeError,
    WorkloadDetails,
};
use relaydeck_relay_db::entities::{access_key, relay, relay_key_link};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// First management port handed out
pub const FIRST_WEB_PORT: i32 = 8080;

/// Longest workload name the platforms accept (DNS-1123 label)
pub const MAX_WORKLOAD_NAME_LEN: usize = 63;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error("Relay {0} not found")]
    RelayNotFound(i32),

    #[error("Invalid relay name '{0}'")]
    InvalidName(String),

    #[error("Invalid UDP port {0}")]
    InvalidPort(i32),

    #[error("Access key {0} not found")]
    UnknownKey(i32),

    #[error("Access key '{alias}' cannot be unsealed: {source}")]
    KeyMaterial {
        alias: String,
        #[source]
        source: CipherError,
    },

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

#[derive(Debug, Clone)]
pub struct CreateRelay {
    pub name: String,
    pub udp_port: i32,
    pub key_ids: Vec<i32>,
    pub tenant_id: Option<i32>,
    pub region: String,
    pub description: String,
}

/// Result of a write that (re)deploys the workload
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionOutcome {
    pub relay_id: i32,
    pub name: String,
    pub web_port: i32,
    /// Set when the record was written but the workload could not be deployed
    pub warning: Option<String>,
}

/// Lowercase, trimmed, spaces replaced by dashes. The result must be a
/// DNS-1123 label short enough to carry the workload `prefix`.
pub fn normalize_relay_name(name: &str, prefix: &str) -> Result<String, ProvisionError> {
    let normalized = name.trim().to_lowercase().replace(' ', "-");
    let max_len = MAX_WORKLOAD_NAME_LEN.saturating_sub(prefix.len());

    if normalized.len() > max_len || !is_dns_label(&normalized) {
        return Err(ProvisionError::InvalidName(name.to_string()));
    }
    Ok(normalized)
}

/// `[a-z0-9]([-a-z0-9]*[a-z0-9])?`
fn is_dns_label(name: &str) -> bool {
    let bytes = name.as_bytes();
    let edge_ok = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            edge_ok(first) && edge_ok(last) && bytes.iter().all(|b| edge_ok(b) || *b == b'-')
        }
        _ => false,
    }
}

#[derive(Clone)]
pub struct RelayProvisioner {
    db: DatabaseConnection,
    orchestrator: Arc<dyn OrchestratorBackend>,
    cipher: Arc<KeyCipher>,
    stats_port: u16,
    status_timeout: Duration,
    name_prefix: String,
}

impl RelayProvisioner {
    pub fn new(
        db: DatabaseConnection,
        orchestrator: Arc<dyn OrchestratorBackend>,
        cipher: Arc<KeyCipher>,
    ) -> Self {
        Self {
            db,
            orchestrator,
            cipher,
            stats_port: relaydeck_orchestrator::DEFAULT_STATS_PORT,
            status_timeout: Duration::from_secs(5),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
        }
    }

    /// Prefix the orchestrator puts in front of relay names
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn with_stats_port(mut self, port: u16) -> Self {
        self.stats_port = port;
        self
    }

    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    pub fn orchestrator_kind(&self) -> OrchestratorKind {
        self.orchestrator.kind()
    }

    /// Relays in the caller's scope with their keys and live status, by name
    pub async fn list(&self, caller: &CallerScope) -> Result<Vec<RelayListing>, ProvisionError> {
        let scope = caller.fleet_scope()?;

        let query = match scope.tenant_id() {
            Some(id) => relay::Entity::find().filter(relay::Column::TenantId.eq(id)),
            None => relay::Entity::find(),
        };
        let relays = query.order_by_asc(relay::Column::Name).all(&self.db).await?;

        let relay_ids: Vec<i32> = relays.iter().map(|r| r.id).collect();
        let links = relay_key_link::Entity::find()
            .filter(relay_key_link::Column::RelayId.is_in(relay_ids))
            .order_by_asc(relay_key_link::Column::Position)
            .find_also_related(access_key::Entity)
            .all(&self.db)
            .await?;

        let mut keys_by_relay: HashMap<i32, Vec<KeyAlias>> = HashMap::new();
        for (link, key) in links {
            if let Some(key) = key {
                keys_by_relay.entry(link.relay_id).or_default().push(KeyAlias {
                    id: key.id,
                    alias: key.alias,
                });
            }
        }

        let statuses = join_all(relays.iter().map(|r| self.bounded_status(&r.name))).await;

        Ok(relays
            .into_iter()
            .zip(statuses)
            .map(|(model, snapshot)| RelayListing {
                keys: keys_by_relay.remove(&model.id).unwrap_or_default(),
                status: snapshot.status,
                id: model.id,
                name: model.name,
                udp_port: model.udp_port,
                web_port: model.web_port,
                tenant_id: model.tenant_id,
                region: model.region,
                description: model.description,
            })
            .collect())
    }

    pub async fn create(
        &self,
        caller: &CallerScope,
        request: CreateRelay,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        caller.require_write()?;

        // Tenant-scoped writers always create inside their own tenant
        let tenant_id = if caller.is_tenant_scoped() {
            Some(
                caller
                    .tenant_id
                    .ok_or_else(|| ScopeError::MissingTenant(caller.role.clone()))?,
            )
        } else {
            request.tenant_id
        };

        let name = normalize_relay_name(&request.name, &self.name_prefix)?;
        let udp_port =
            u16::try_from(request.udp_port).map_err(|_| ProvisionError::InvalidPort(request.udp_port))?;
        if udp_port == 0 {
            return Err(ProvisionError::InvalidPort(request.udp_port));
        }

        let txn = self.db.begin().await?;

        let keys = resolve_keys(&txn, caller.fleet_scope()?, &request.key_ids).await?;
        let allowed_keys = self.unseal(&keys)?;

        let max_port: Option<Option<i32>> = relay::Entity::find()
            .select_only()
            .column_as(relay::Column::WebPort.max(), "max_port")
            .into_tuple()
            .one(&txn)
            .await?;
        let web_port = max_port.flatten().map(|p| p + 1).unwrap_or(FIRST_WEB_PORT);

        let model = relay::ActiveModel {
            name: Set(name.clone()),
            udp_port: Set(request.udp_port),
            web_port: Set(web_port),
            tenant_id: Set(tenant_id),
            region: Set(request.region),
            description: Set(request.description),
            created_at: Set(chrono::Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        link_keys(&txn, model.id, &keys).await?;
        txn.commit().await?;

        info!(relay = %name, relay_id = model.id, web_port, keys = keys.len(), "Relay created");

        let warning = self.deploy(&name, udp_port, allowed_keys).await;
        Ok(ProvisionOutcome {
            relay_id: model.id,
            name,
            web_port,
            warning,
        })
    }

    /// Replace the assignment set and redeploy
    pub async fn replace_keys(
        &self,
        caller: &CallerScope,
        relay_id: i32,
        key_ids: &[i32],
    ) -> Result<ProvisionOutcome, ProvisionError> {
        caller.require_write()?;
        let model = self.load(caller, relay_id).await?;
        let udp_port = u16::try_from(model.udp_port)
            .map_err(|_| ProvisionError::InvalidPort(model.udp_port))?;

        let txn = self.db.begin().await?;
        let keys = resolve_keys(&txn, caller.fleet_scope()?, key_ids).await?;
        let allowed_keys = self.unseal(&keys)?;

        relay_key_link::Entity::delete_many()
            .filter(relay_key_link::Column::RelayId.eq(model.id))
            .exec(&txn)
            .await?;
        link_keys(&txn, model.id, &keys).await?;
        txn.commit().await?;

        info!(relay = %model.name, keys = keys.len(), "Relay keys replaced");

        let warning = self.deploy(&model.name, udp_port, allowed_keys).await;
        Ok(ProvisionOutcome {
            relay_id: model.id,
            name: model.name,
            web_port: model.web_port,
            warning,
        })
    }

    /// Remove the workload (best effort) and then the record
    pub async fn delete(&self, caller: &CallerScope, relay_id: i32) -> Result<String, ProvisionError> {
        caller.require_write()?;
        let model = self.load(caller, relay_id).await?;

        if let Err(e) = self.orchestrator.remove(&model.name).await {
            warn!(relay = %model.name, "Failed to remove workload: {}", e);
        }

        let name = model.name.clone();
        model.delete(&self.db).await?;
        info!(relay = %name, relay_id, "Relay deleted");
        Ok(name)
    }

    pub async fn start(&self, caller: &CallerScope, relay_id: i32) -> Result<(), ProvisionError> {
        caller.require_write()?;
        let model = self.load(caller, relay_id).await?;
        self.orchestrator.start(&model.name).await?;
        info!(relay = %model.name, "Relay started");
        Ok(())
    }

    pub async fn stop(&self, caller: &CallerScope, relay_id: i32) -> Result<(), ProvisionError> {
        caller.require_write()?;
        let model = self.load(caller, relay_id).await?;
        self.orchestrator.stop(&model.name).await?;
        info!(relay = %model.name, "Relay stopped");
        Ok(())
    }

    pub async fn restart(&self, caller: &CallerScope, relay_id: i32) -> Result<(), ProvisionError> {
        caller.require_write()?;
        let model = self.load(caller, relay_id).await?;
        self.orchestrator.restart(&model.name).await?;
        info!(relay = %model.name, "Relay restarted");
        Ok(())
    }

    /// Platform-level detail of the relay's workload
    pub async fn details(
        &self,
        caller: &CallerScope,
        relay_id: i32,
    ) -> Result<WorkloadDetails, ProvisionError> {
        let model = self.load(caller, relay_id).await?;
        Ok(self.orchestrator.details(&model.name).await?)
    }

    /// Last `tail` log lines of the workload
    pub async fn logs(
        &self,
        caller: &CallerScope,
        relay_id: i32,
        tail: usize,
    ) -> Result<Vec<String>, ProvisionError> {
        let model = self.load(caller, relay_id).await?;
        Ok(self.orchestrator.logs(&model.name, tail).await?)
    }

    /// Record for `relay_id`, checked against the caller's scope
    async fn load(&self, caller: &CallerScope, relay_id: i32) -> Result<relay::Model, ProvisionError> {
        caller.fleet_scope()?;
        let model = relay::Entity::find_by_id(relay_id)
            .one(&self.db)
            .await?
            .ok_or(ProvisionError::RelayNotFound(relay_id))?;
        caller.authorize_tenant(model.tenant_id)?;
        Ok(model)
    }

    async fn bounded_status(&self, relay_name: &str) -> OrchestratorSnapshot {
        tokio::time::timeout(self.status_timeout, self.orchestrator.status(relay_name))
            .await
            .unwrap_or_else(|_| OrchestratorSnapshot::error())
    }

    /// Plaintext key material in assignment order
    fn unseal(&self, keys: &[access_key::Model]) -> Result<Vec<String>, ProvisionError> {
        keys.iter()
            .map(|k| {
                self.cipher
                    .decrypt(&k.key_value)
                    .map_err(|source| ProvisionError::KeyMaterial {
                        alias: k.alias.clone(),
                        source,
                    })
            })
            .collect()
    }

    async fn deploy(&self, name: &str, udp_port: u16, allowed_keys: Vec<String>) -> Option<String> {
        let deployment =
            RelayDeployment::new(name, udp_port, allowed_keys).with_stats_port(self.stats_port);

        match self.orchestrator.deploy(&deployment).await {
            Ok(()) => None,
            Err(e) => {
                warn!(relay = %name, "Deployment failed: {}", e);
                Some(e.to_string())
            }
        }
    }
}

/// Load the requested keys in request order, dropping duplicates. Every key
/// must exist and be visible to the caller's scope.
async fn resolve_keys<C: ConnectionTrait>(
    db: &C,
    scope: FleetScope,
    key_ids: &[i32],
) -> Result<Vec<access_key::Model>, ProvisionError> {
    let mut seen = HashSet::new();
    let ordered: Vec<i32> = key_ids.iter().copied().filter(|id| seen.insert(*id)).collect();
    if ordered.is_empty() {
        return Ok(Vec::new());
    }

    let mut found: HashMap<i32, access_key::Model> = access_key::Entity::find()
        .filter(access_key::Column::Id.is_in(ordered.clone()))
        .all(db)
        .await?
        .into_iter()
        .map(|k| (k.id, k))
        .collect();

    ordered
        .into_iter()
        .map(|id| {
            let key = found.remove(&id).ok_or(ProvisionError::UnknownKey(id))?;
            if !scope.admits(key.tenant_id) {
                return Err(ScopeError::ForeignTenant.into());
            }
            Ok(key)
        })
        .collect()
}

async fn link_keys<C: ConnectionTrait>(
    db: &C,
    relay_id: i32,
    keys: &[access_key::Model],
) -> Result<(), DbErr> {
    for (position, key) in keys.iter().enumerate() {
        relay_key_link::ActiveModel {
            relay_id: Set(relay_id),
            key_id: Set(key.id),
            position: Set(i32::try_from(position).unwrap_or(i32::MAX)),
            assigned_at: Set(chrono::Utc::now()),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}
