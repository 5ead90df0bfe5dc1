//! Access key registry: list, create and delete keys within the caller's scope

use relaydeck_auth::{CipherError, KeyCipher};
use relaydeck_proto::{AccessKeyInfo, CallerScope, ScopeError};
use relaydeck_relay_db::entities::{access_key, relay_key_link};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub const MAX_ALIAS_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error("Access key {0} not found")]
    NotFound(i32),

    #[error("Invalid key: {0}")]
    Invalid(String),

    #[error("Failed to seal key material: {0}")]
    Seal(#[from] CipherError),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

#[derive(Debug, Clone)]
pub struct CreateKey {
    pub alias: String,
    pub key_value: String,
    pub tenant_id: Option<i32>,
}

#[derive(Clone)]
pub struct KeyStore {
    db: DatabaseConnection,
    cipher: Arc<KeyCipher>,
}

impl KeyStore {
    pub fn new(db: DatabaseConnection, cipher: Arc<KeyCipher>) -> Self {
        Self { db, cipher }
    }

    pub async fn list(&self, caller: &CallerScope) -> Result<Vec<AccessKeyInfo>, KeyStoreError> {
        let scope = caller.fleet_scope()?;
        let query = match scope.tenant_id() {
            Some(id) => access_key::Entity::find().filter(access_key::Column::TenantId.eq(id)),
            None => access_key::Entity::find(),
        };
        let keys = query
            .order_by_asc(access_key::Column::Alias)
            .all(&self.db)
            .await?;

        let key_ids: Vec<i32> = keys.iter().map(|k| k.id).collect();
        let counts: HashMap<i32, i64> = relay_key_link::Entity::find()
            .select_only()
            .column(relay_key_link::Column::KeyId)
            .column_as(relay_key_link::Column::RelayId.count(), "relay_count")
            .filter(relay_key_link::Column::KeyId.is_in(key_ids))
            .group_by(relay_key_link::Column::KeyId)
            .into_tuple::<(i32, i64)>()
            .all(&self.db)
            .await?
            .into_iter()
            .collect();

        Ok(keys
            .into_iter()
            .map(|k| AccessKeyInfo {
                relay_count: counts.get(&k.id).copied().unwrap_or(0).max(0) as u64,
                id: k.id,
                alias: k.alias,
                tenant_id: k.tenant_id,
                created_at: k.created_at,
            })
            .collect())
    }

    /// Store a new key. Tenant-scoped writers always create in their own tenant.
    pub async fn create(
        &self,
        caller: &CallerScope,
        request: CreateKey,
    ) -> Result<AccessKeyInfo, KeyStoreError> {
        caller.require_write()?;
        let tenant_id = match caller.fleet_scope()?.tenant_id() {
            Some(own) => Some(own),
            None => request.tenant_id,
        };

        let alias = request.alias.trim().to_string();
        if alias.is_empty() || alias.len() > MAX_ALIAS_LEN {
            return Err(KeyStoreError::Invalid(format!(
                "alias must be 1 to {} characters",
                MAX_ALIAS_LEN
            )));
        }
        let key_value = request.key_value.trim();
        if key_value.is_empty() {
            return Err(KeyStoreError::Invalid("key value is empty".to_string()));
        }

        let model = access_key::ActiveModel {
            alias: Set(alias),
            key_value: Set(self.cipher.encrypt(key_value)?),
            tenant_id: Set(tenant_id),
            created_at: Set(chrono::Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        info!(key_id = model.id, alias = %model.alias, tenant_id = ?model.tenant_id, "Access key created");

        Ok(AccessKeyInfo {
            id: model.id,
            alias: model.alias,
            tenant_id: model.tenant_id,
            relay_count: 0,
            created_at: model.created_at,
        })
    }

    /// Remove a key and its relay assignments. Running relays keep the key
    /// until they are redeployed.
    pub async fn delete(&self, caller: &CallerScope, key_id: i32) -> Result<String, KeyStoreError> {
        caller.require_write()?;
        let model = access_key::Entity::find_by_id(key_id)
            .one(&self.db)
            .await?
            .ok_or(KeyStoreError::NotFound(key_id))?;
        caller.authorize_tenant(model.tenant_id)?;

        let txn = self.db.begin().await?;
        relay_key_link::Entity::delete_many()
            .filter(relay_key_link::Column::KeyId.eq(key_id))
            .exec(&txn)
            .await?;
        let alias = model.alias.clone();
        model.delete(&txn).await?;
        txn.commit().await?;

        info!(key_id, alias = %alias, "Access key deleted");
        Ok(alias)
    }
}
