//! Tenant registry. Everyone reads within scope, only admins write.

use rand::distributions::Alphanumeric;
use rand::Rng;
use relaydeck_proto::{round1, CallerScope, ScopeError, TenantCreated, TenantRecord};
use relaydeck_relay_db::entities::{access_key, relay, relay_key_link, tenant};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

const API_KEY_LEN: usize = 40;

#[derive(Debug, Error)]
pub enum TenantStoreError {
    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error("Tenant {0} not found")]
    NotFound(i32),

    #[error("Invalid tenant: {0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

#[derive(Debug, Clone)]
pub struct CreateTenant {
    pub name: String,
    pub slug: String,
    pub max_relays: i32,
    pub max_bandwidth_mbps: i32,
    pub sla_target: f64,
    pub allowed_regions: Vec<String>,
    pub preferred_relay_ids: Vec<i32>,
}

/// Partial update; `None` leaves the field unchanged
#[derive(Debug, Clone, Default)]
pub struct UpdateTenant {
    pub name: Option<String>,
    pub max_relays: Option<i32>,
    pub max_bandwidth_mbps: Option<i32>,
    pub sla_target: Option<f64>,
    pub allowed_regions: Option<Vec<String>>,
    pub preferred_relay_ids: Option<Vec<i32>>,
    pub is_active: Option<bool>,
}

impl UpdateTenant {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.max_relays.is_none()
            && self.max_bandwidth_mbps.is_none()
            && self.sla_target.is_none()
            && self.allowed_regions.is_none()
            && self.preferred_relay_ids.is_none()
            && self.is_active.is_none()
    }
}

/// Lowercase, trimmed, spaces replaced by dashes
pub fn normalize_slug(slug: &str) -> String {
    slug.trim().to_lowercase().replace(' ', "-")
}

fn generate_api_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_LEN)
        .map(char::from)
        .collect()
}

fn validate_quota(max_relays: i32, max_bandwidth_mbps: i32, sla_target: f64) -> Result<(), TenantStoreError> {
    if max_relays < 0 || max_bandwidth_mbps < 0 {
        return Err(TenantStoreError::Invalid("quotas must not be negative".to_string()));
    }
    if !(0.0..=100.0).contains(&sla_target) {
        return Err(TenantStoreError::Invalid(format!(
            "SLA target {} outside [0, 100]",
            sla_target
        )));
    }
    Ok(())
}

fn to_record(model: tenant::Model, used_relays: i64) -> TenantRecord {
    let usage_pct = if model.max_relays > 0 {
        round1(used_relays as f64 / model.max_relays as f64 * 100.0)
    } else {
        0.0
    };
    TenantRecord {
        allowed_regions: model.allowed_regions(),
        preferred_relay_ids: model.preferred_relay_ids(),
        id: model.id,
        name: model.name,
        slug: model.slug,
        max_relays: model.max_relays,
        max_bandwidth_mbps: model.max_bandwidth_mbps,
        sla_target: model.sla_target,
        is_active: model.is_active,
        used_relays,
        usage_pct,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

fn encode<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string())
}

#[derive(Clone)]
pub struct TenantStore {
    db: DatabaseConnection,
}

impl TenantStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// All tenants for global roles, only their own for tenant-scoped roles
    pub async fn list(&self, caller: &CallerScope) -> Result<Vec<TenantRecord>, TenantStoreError> {
        let scope = caller.fleet_scope()?;
        let query = match scope.tenant_id() {
            Some(id) => tenant::Entity::find().filter(tenant::Column::Id.eq(id)),
            None => tenant::Entity::find(),
        };
        let tenants = query.order_by_asc(tenant::Column::Name).all(&self.db).await?;
        let counts = self.relay_counts().await?;

        Ok(tenants
            .into_iter()
            .map(|t| {
                let used = counts.get(&t.id).copied().unwrap_or(0);
                to_record(t, used)
            })
            .collect())
    }

    pub async fn get(&self, caller: &CallerScope, tenant_id: i32) -> Result<TenantRecord, TenantStoreError> {
        caller.authorize_tenant(Some(tenant_id))?;
        let model = self.load(tenant_id).await?;
        let used = self.used_relays(tenant_id).await?;
        Ok(to_record(model, used))
    }

    pub async fn create(
        &self,
        caller: &CallerScope,
        request: CreateTenant,
    ) -> Result<TenantCreated, TenantStoreError> {
        caller.require_admin()?;

        let name = request.name.trim().to_string();
        let slug = normalize_slug(&request.slug);
        if name.is_empty() || slug.is_empty() {
            return Err(TenantStoreError::Invalid("name and slug are required".to_string()));
        }
        validate_quota(request.max_relays, request.max_bandwidth_mbps, request.sla_target)?;

        let api_key = generate_api_key();
        let now = chrono::Utc::now();
        let model = tenant::ActiveModel {
            name: Set(name),
            slug: Set(slug),
            max_relays: Set(request.max_relays),
            max_bandwidth_mbps: Set(request.max_bandwidth_mbps),
            sla_target: Set(request.sla_target),
            allowed_regions: Set(encode(&request.allowed_regions)),
            preferred_relay_ids: Set(encode(&request.preferred_relay_ids)),
            api_key: Set(api_key.clone()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        info!(tenant_id = model.id, slug = %model.slug, "Tenant created");
        Ok(TenantCreated {
            tenant: to_record(model, 0),
            api_key,
        })
    }

    pub async fn update(
        &self,
        caller: &CallerScope,
        tenant_id: i32,
        update: UpdateTenant,
    ) -> Result<TenantRecord, TenantStoreError> {
        caller.require_admin()?;
        let model = self.load(tenant_id).await?;
        if update.is_empty() {
            let used = self.used_relays(tenant_id).await?;
            return Ok(to_record(model, used));
        }

        validate_quota(
            update.max_relays.unwrap_or(model.max_relays),
            update.max_bandwidth_mbps.unwrap_or(model.max_bandwidth_mbps),
            update.sla_target.unwrap_or(model.sla_target),
        )?;

        let mut active: tenant::ActiveModel = model.into();
        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(TenantStoreError::Invalid("name must not be empty".to_string()));
            }
            active.name = Set(name);
        }
        if let Some(max_relays) = update.max_relays {
            active.max_relays = Set(max_relays);
        }
        if let Some(bandwidth) = update.max_bandwidth_mbps {
            active.max_bandwidth_mbps = Set(bandwidth);
        }
        if let Some(sla) = update.sla_target {
            active.sla_target = Set(sla);
        }
        if let Some(regions) = update.allowed_regions {
            active.allowed_regions = Set(encode(&regions));
        }
        if let Some(preferred) = update.preferred_relay_ids {
            active.preferred_relay_ids = Set(encode(&preferred));
        }
        if let Some(is_active) = update.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(chrono::Utc::now());

        let model = active.update(&self.db).await?;
        info!(tenant_id, "Tenant updated");

        let used = self.used_relays(tenant_id).await?;
        Ok(to_record(model, used))
    }

    /// Delete a tenant with its keys. Its relays become global.
    pub async fn delete(&self, caller: &CallerScope, tenant_id: i32) -> Result<String, TenantStoreError> {
        caller.require_admin()?;
        let model = self.load(tenant_id).await?;
        let name = model.name.clone();

        let txn = self.db.begin().await?;
        let key_ids: Vec<i32> = access_key::Entity::find()
            .select_only()
            .column(access_key::Column::Id)
            .filter(access_key::Column::TenantId.eq(tenant_id))
            .into_tuple()
            .all(&txn)
            .await?;
        relay_key_link::Entity::delete_many()
            .filter(relay_key_link::Column::KeyId.is_in(key_ids.clone()))
            .exec(&txn)
            .await?;
        access_key::Entity::delete_many()
            .filter(access_key::Column::TenantId.eq(tenant_id))
            .exec(&txn)
            .await?;
        relay::Entity::update_many()
            .col_expr(relay::Column::TenantId, Expr::value(Option::<i32>::None))
            .filter(relay::Column::TenantId.eq(tenant_id))
            .exec(&txn)
            .await?;
        model.delete(&txn).await?;
        txn.commit().await?;

        info!(tenant_id, tenant = %name, keys = key_ids.len(), "Tenant deleted");
        Ok(name)
    }

    async fn load(&self, tenant_id: i32) -> Result<tenant::Model, TenantStoreError> {
        tenant::Entity::find_by_id(tenant_id)
            .one(&self.db)
            .await?
            .ok_or(TenantStoreError::NotFound(tenant_id))
    }

    async fn used_relays(&self, tenant_id: i32) -> Result<i64, TenantStoreError> {
        Ok(self.relay_counts().await?.get(&tenant_id).copied().unwrap_or(0))
    }

    async fn relay_counts(&self) -> Result<HashMap<i32, i64>, DbErr> {
        let rows: Vec<(Option<i32>, i64)> = relay::Entity::find()
            .select_only()
            .column(relay::Column::TenantId)
            .column_as(relay::Column::Id.count(), "used")
            .group_by(relay::Column::TenantId)
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(tenant_id, used)| tenant_id.map(|id| (id, used)))
            .collect())
    }
}
