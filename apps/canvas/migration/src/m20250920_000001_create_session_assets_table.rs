use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SessionAssets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SessionAssets::AssetId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SessionAssets::SessionId).big_integer().not_null())
                    .col(ColumnDef::new(SessionAssets::AssetType).string_len(50).not_null())
                    .col(ColumnDef::new(SessionAssets::AssetSelector).string_len(200).not_null())
                    .col(ColumnDef::new(SessionAssets::Position).integer())
                    .col(ColumnDef::new(SessionAssets::CssPattern).string_len(500))
                    .col(ColumnDef::new(SessionAssets::SharedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(SessionAssets::IsActive).boolean().not_null().default(true))
                    .col(ColumnDef::new(SessionAssets::DetectedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(SessionAssets::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(SessionAssets::CreatedBy).string_len(100))
                    .foreign_key(
                        ForeignKey::create()
                            .name("FK_session_assets_session_id")
                            .from(SessionAssets::Table, SessionAssets::SessionId)
                            .to(Sessions::Table, Sessions::SessionId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("IX_session_assets_session_type")
                    .table(SessionAssets::Table)
                    .col(SessionAssets::SessionId)
                    .col(SessionAssets::AssetType)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SessionAssets::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SessionAssets {
    Table,
    AssetId,
    SessionId,
    AssetType,
    AssetSelector,
    Position,
    CssPattern,
    SharedAt,
    IsActive,
    DetectedAt,
    CreatedAt,
    CreatedBy,
}

#[derive(DeriveIden)]
enum Sessions {
    Table,
    SessionId,
}
