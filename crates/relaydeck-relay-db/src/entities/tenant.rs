//! Tenant entity: an isolated customer scope with quota and policy attributes

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Display name (unique)
    #[sea_orm(unique)]
    pub name: String,

    /// URL-friendly identifier (unique)
    #[sea_orm(unique)]
    pub slug: String,

    /// Relay capacity quota
    pub max_relays: i32,

    pub max_bandwidth_mbps: i32,

    /// SLA availability target in percent
    pub sla_target: f64,

    /// JSON-encoded Vec<String>
    #[sea_orm(column_type = "Text")]
    pub allowed_regions: String,

    /// JSON-encoded Vec<i32>
    #[sea_orm(column_type = "Text")]
    pub preferred_relay_ids: String,

    #[sea_orm(unique)]
    pub api_key: String,

    pub is_active: bool,

    pub created_at: ChronoDateTimeUtc,

    pub updated_at: ChronoDateTimeUtc,
}

impl Model {
    pub fn allowed_regions(&self) -> Vec<String> {
        serde_json::from_str(&self.allowed_regions).unwrap_or_default()
    }

    pub fn preferred_relay_ids(&self) -> Vec<i32> {
        serde_json::from_str(&self.preferred_relay_ids).unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Tenant owns relays
    #[sea_orm(has_many = "super::relay::Entity")]
    Relays,

    /// Tenant owns access keys
    #[sea_orm(has_many = "super::access_key::Entity")]
    AccessKeys,
}

impl Related<super::relay::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Relays.def()
    }
}

impl Related<super::access_key::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AccessKeys.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
