//! AccessKey entity: key material a relay admits peers with

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "access_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub alias: String,

    /// Key material, sealed with `relaydeck_auth::KeyCipher`
    #[sea_orm(column_type = "Text")]
    #[serde(skip_serializing)]
    pub key_value: String,

    /// Owning tenant (None = shared key)
    pub tenant_id: Option<i32>,

    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Key belongs to a tenant
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Tenant,

    /// Key is assigned to relays
    #[sea_orm(has_many = "super::relay_key_link::Entity")]
    RelayLinks,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::relay_key_link::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RelayLinks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
