//! Initial schema: tenants, relays, access keys and the key assignment link

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ============================================================
        // 1. Create tenants table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Tenant::Table)
                    .if_not_exists()
                    .col(pk_auto(Tenant::Id))
                    .col(string_len(Tenant::Name, 255).not_null().unique_key())
                    .col(string_len(Tenant::Slug, 255).not_null().unique_key())
                    .col(integer(Tenant::MaxRelays).not_null().default(10))
                    .col(integer(Tenant::MaxBandwidthMbps).not_null().default(100))
                    .col(double(Tenant::SlaTarget).not_null().default(99.9))
                    .col(text(Tenant::AllowedRegions).not_null().default("[]"))
                    .col(text(Tenant::PreferredRelayIds).not_null().default("[]"))
                    .col(string_len(Tenant::ApiKey, 128).not_null().unique_key())
                    .col(boolean(Tenant::IsActive).not_null().default(true))
                    .col(
                        timestamp_with_time_zone(Tenant::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Tenant::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 2. Create relays table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Relay::Table)
                    .if_not_exists()
                    .col(pk_auto(Relay::Id))
                    .col(string_len(Relay::Name, 64).not_null().unique_key())
                    .col(integer(Relay::UdpPort).not_null().unique_key())
                    .col(integer(Relay::WebPort).not_null().unique_key())
                    .col(integer_null(Relay::TenantId))
                    .col(string_len(Relay::Region, 64).not_null().default(""))
                    .col(text(Relay::Description).not_null().default(""))
                    .col(
                        timestamp_with_time_zone(Relay::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_relays_tenant_id")
                            .from(Relay::Table, Relay::TenantId)
                            .to(Tenant::Table, Tenant::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_relays_tenant_id")
                    .table(Relay::Table)
                    .col(Relay::TenantId)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 3. Create access_keys table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(AccessKey::Table)
                    .if_not_exists()
                    .col(pk_auto(AccessKey::Id))
                    .col(string_len(AccessKey::Alias, 64).not_null())
                    .col(text(AccessKey::KeyValue).not_null())
                    .col(integer_null(AccessKey::TenantId))
                    .col(
                        timestamp_with_time_zone(AccessKey::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_access_keys_tenant_id")
                            .from(AccessKey::Table, AccessKey::TenantId)
                            .to(Tenant::Table, Tenant::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_access_keys_tenant_id")
                    .table(AccessKey::Table)
                    .col(AccessKey::TenantId)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 4. Create relay_keys_link junction table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(RelayKeyLink::Table)
                    .if_not_exists()
                    .col(integer(RelayKeyLink::RelayId).not_null())
                    .col(integer(RelayKeyLink::KeyId).not_null())
                    .col(integer(RelayKeyLink::Position).not_null().default(0))
                    .col(
                        timestamp_with_time_zone(RelayKeyLink::AssignedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(RelayKeyLink::RelayId)
                            .col(RelayKeyLink::KeyId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_relay_keys_link_relay_id")
                            .from(RelayKeyLink::Table, RelayKeyLink::RelayId)
                            .to(Relay::Table, Relay::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_relay_keys_link_key_id")
                            .from(RelayKeyLink::Table, RelayKeyLink::KeyId)
                            .to(AccessKey::Table, AccessKey::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_relay_keys_link_key_id")
                    .table(RelayKeyLink::Table)
                    .col(RelayKeyLink::KeyId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop tables in reverse order (respecting foreign keys)
        manager
            .drop_table(Table::drop().table(RelayKeyLink::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(AccessKey::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Relay::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Tenant::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Tenant {
    #[sea_orm(iden = "tenants")]
    Table,
    Id,
    Name,
    Slug,
    MaxRelays,
    MaxBandwidthMbps,
    SlaTarget,
    AllowedRegions,
    PreferredRelayIds,
    ApiKey,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Relay {
    #[sea_orm(iden = "relays")]
    Table,
    Id,
    Name,
    UdpPort,
    WebPort,
    TenantId,
    Region,
    Description,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AccessKey {
    #[sea_orm(iden = "access_keys")]
    Table,
    Id,
    Alias,
    KeyValue,
    TenantId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum RelayKeyLink {
    #[sea_orm(iden = "relay_keys_link")]
    Table,
    RelayId,
    KeyId,
    Position,
    AssignedAt,
}
