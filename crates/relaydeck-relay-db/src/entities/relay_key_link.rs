//! RelayKeyLink entity: many-to-many key assignment between relays and access keys

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "relay_keys_link")]
pub struct Model {
    /// Relay ID (composite primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub relay_id: i32,

    /// Key ID (composite primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub key_id: i32,

    /// Order in which the key was assigned to the relay
    pub position: i32,

    pub assigned_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::relay::Entity",
        from = "Column::RelayId",
        to = "super::relay::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Relay,

    #[sea_orm(
        belongs_to = "super::access_key::Entity",
        from = "Column::KeyId",
        to = "super::access_key::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    AccessKey,
}

impl Related<super::relay::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Relay.def()
    }
}

impl Related<super::access_key::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AccessKey.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
