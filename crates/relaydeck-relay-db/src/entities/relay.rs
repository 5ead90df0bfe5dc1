//! Relay entity: one provisioned relay workload

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "relays")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Normalized relay name (lowercase, no spaces); the workload name is derived from it
    #[sea_orm(unique)]
    pub name: String,

    /// UDP data port
    #[sea_orm(unique)]
    pub udp_port: i32,

    /// Management / stats port
    #[sea_orm(unique)]
    pub web_port: i32,

    /// Owning tenant (None = global relay)
    pub tenant_id: Option<i32>,

    pub region: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Relay belongs to a tenant
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id",
        on_update = "Cascade",
        on_delete = "SetNull"
    )]
    Tenant,

    /// Relay has key assignments
    #[sea_orm(has_many = "super::relay_key_link::Entity")]
    KeyLinks,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::relay_key_link::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::KeyLinks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
