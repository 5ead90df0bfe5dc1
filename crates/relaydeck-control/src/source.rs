//! Read-only fleet records
//!
//! Every query takes the caller's [`FleetScope`] and applies the same
//! tenant filter, so the aggregator, the alert deriver and the topology
//! builder can never see different slices of the fleet.

use async_trait::async_trait;
use relaydeck_proto::{FleetScope, KeyAssignment, KeyRecord, RelayRecord, TenantQuota};
use relaydeck_relay_db::entities::{access_key, relay, relay_key_link, tenant};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Select,
};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetSourceError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Relay, key, assignment and tenant records visible to a scope
#[async_trait]
pub trait FleetSource: Send + Sync {
    /// Relays in scope, ordered by name
    async fn list_relays(&self, scope: FleetScope) -> Result<Vec<RelayRecord>, FleetSourceError>;

    /// Single relay regardless of scope; callers authorize the owner
    async fn get_relay(&self, relay_id: i32) -> Result<Option<RelayRecord>, FleetSourceError>;

    async fn count_active_tenants(&self, scope: FleetScope) -> Result<u64, FleetSourceError>;

    /// Quotas of the active tenants in scope, ordered by name
    async fn tenant_quotas(&self, scope: FleetScope) -> Result<Vec<TenantQuota>, FleetSourceError>;

    async fn tenant_quota(&self, tenant_id: i32) -> Result<Option<TenantQuota>, FleetSourceError>;

    /// Access keys in scope, ordered by alias
    async fn list_keys(&self, scope: FleetScope) -> Result<Vec<KeyRecord>, FleetSourceError>;

    /// Assignments whose key and relay are both in scope, ordered by relay
    /// then assignment position
    async fn list_assignments(
        &self,
        scope: FleetScope,
    ) -> Result<Vec<KeyAssignment>, FleetSourceError>;
}

/// [`FleetSource`] backed by the relational store
#[derive(Clone)]
pub struct DatabaseFleetSource {
    db: DatabaseConnection,
}

impl DatabaseFleetSource {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn scoped_relays(scope: FleetScope) -> Select<relay::Entity> {
        match scope.tenant_id() {
            Some(id) => relay::Entity::find().filter(relay::Column::TenantId.eq(id)),
            None => relay::Entity::find(),
        }
    }

    fn scoped_tenants(scope: FleetScope) -> Select<tenant::Entity> {
        let query = tenant::Entity::find().filter(tenant::Column::IsActive.eq(true));
        match scope.tenant_id() {
            Some(id) => query.filter(tenant::Column::Id.eq(id)),
            None => query,
        }
    }

    async fn quota_for(&self, model: tenant::Model) -> Result<TenantQuota, FleetSourceError> {
        let used = relay::Entity::find()
            .filter(relay::Column::TenantId.eq(model.id))
            .count(&self.db)
            .await?;

        Ok(TenantQuota {
            tenant_id: model.id,
            name: model.name,
            max_relays: model.max_relays,
            used_relays: i64::try_from(used).unwrap_or(i64::MAX),
            max_bandwidth_mbps: model.max_bandwidth_mbps,
        })
    }
}

pub(crate) fn relay_record(model: relay::Model) -> RelayRecord {
    RelayRecord {
        id: model.id,
        name: model.name,
        udp_port: model.udp_port,
        web_port: model.web_port,
        tenant_id: model.tenant_id,
        region: model.region,
    }
}

#[async_trait]
impl FleetSource for DatabaseFleetSource {
    async fn list_relays(&self, scope: FleetScope) -> Result<Vec<RelayRecord>, FleetSourceError> {
        let relays = Self::scoped_relays(scope)
            .order_by_asc(relay::Column::Name)
            .all(&self.db)
            .await?;

        Ok(relays.into_iter().map(relay_record).collect())
    }

    async fn get_relay(&self, relay_id: i32) -> Result<Option<RelayRecord>, FleetSourceError> {
        let relay = relay::Entity::find_by_id(relay_id).one(&self.db).await?;
        Ok(relay.map(relay_record))
    }

    async fn count_active_tenants(&self, scope: FleetScope) -> Result<u64, FleetSourceError> {
        Ok(Self::scoped_tenants(scope).count(&self.db).await?)
    }

    async fn tenant_quotas(&self, scope: FleetScope) -> Result<Vec<TenantQuota>, FleetSourceError> {
        let tenants = Self::scoped_tenants(scope)
            .order_by_asc(tenant::Column::Name)
            .all(&self.db)
            .await?;

        let mut quotas = Vec::with_capacity(tenants.len());
        for model in tenants {
            quotas.push(self.quota_for(model).await?);
        }
        Ok(quotas)
    }

    async fn tenant_quota(&self, tenant_id: i32) -> Result<Option<TenantQuota>, FleetSourceError> {
        match tenant::Entity::find_by_id(tenant_id).one(&self.db).await? {
            Some(model) => Ok(Some(self.quota_for(model).await?)),
            None => Ok(None),
        }
    }

    async fn list_keys(&self, scope: FleetScope) -> Result<Vec<KeyRecord>, FleetSourceError> {
        let query = match scope.tenant_id() {
            Some(id) => access_key::Entity::find().filter(access_key::Column::TenantId.eq(id)),
            None => access_key::Entity::find(),
        };

        let keys = query
            .order_by_asc(access_key::Column::Alias)
            .find_also_related(tenant::Entity)
            .all(&self.db)
            .await?;

        Ok(keys
            .into_iter()
            .map(|(key, owner)| KeyRecord {
                id: key.id,
                alias: key.alias,
                tenant_id: key.tenant_id,
                tenant_name: owner.map(|t| t.name),
            })
            .collect())
    }

    async fn list_assignments(
        &self,
        scope: FleetScope,
    ) -> Result<Vec<KeyAssignment>, FleetSourceError> {
        let keys: HashMap<i32, KeyRecord> = self
            .list_keys(scope)
            .await?
            .into_iter()
            .map(|k| (k.id, k))
            .collect();

        let relays: HashMap<i32, String> = Self::scoped_relays(scope)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|r| (r.id, r.name))
            .collect();

        let links = relay_key_link::Entity::find()
            .order_by_asc(relay_key_link::Column::RelayId)
            .order_by_asc(relay_key_link::Column::Position)
            .order_by_asc(relay_key_link::Column::KeyId)
            .all(&self.db)
            .await?;

        Ok(links
            .into_iter()
            .filter_map(|link| {
                let key = keys.get(&link.key_id)?;
                let relay_name = relays.get(&link.relay_id)?;
                Some(KeyAssignment {
                    key_id: link.key_id,
                    relay_id: link.relay_id,
                    relay_name: relay_name.clone(),
                    position: link.position,
                    tenant_id: key.tenant_id,
                    tenant_name: key.tenant_name.clone(),
                })
            })
            .collect())
    }
}
