use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Sessions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Sessions::SessionId).big_integer().not_null().primary_key())
                    .col(ColumnDef::new(Sessions::HostToken).string_len(8).not_null())
                    .col(ColumnDef::new(Sessions::UserToken).string_len(8).not_null())
                    .col(ColumnDef::new(Sessions::Title).string_len(200))
                    .col(ColumnDef::new(Sessions::Description).string_len(500))
                    .col(ColumnDef::new(Sessions::Status).string_len(20).not_null())
                    .col(ColumnDef::new(Sessions::HostGuidHash).string_len(100))
                    .col(ColumnDef::new(Sessions::AlbumId).integer())
                    .col(ColumnDef::new(Sessions::CategoryId).integer())
                    .col(ColumnDef::new(Sessions::ScheduledDate).string_len(50))
                    .col(ColumnDef::new(Sessions::ScheduledTime).string_len(50))
                    .col(ColumnDef::new(Sessions::ScheduledDuration).string_len(50))
                    .col(ColumnDef::new(Sessions::CreatedBy).string_len(100))
                    .col(ColumnDef::new(Sessions::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Sessions::ModifiedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Sessions::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Sessions::EndedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Sessions::ExpiresAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("UQ_sessions_host_token")
                    .table(Sessions::Table)
                    .col(Sessions::HostToken)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("UQ_sessions_user_token")
                    .table(Sessions::Table)
                    .col(Sessions::UserToken)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("IX_sessions_status_expires")
                    .table(Sessions::Table)
                    .col(Sessions::Status)
                    .col(Sessions::ExpiresAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Sessions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Sessions {
    Table,
    SessionId,
    HostToken,
    UserToken,
    Title,
    Description,
    Status,
    HostGuidHash,
    AlbumId,
    CategoryId,
    ScheduledDate,
    ScheduledTime,
    ScheduledDuration,
    CreatedBy,
    CreatedAt,
    ModifiedAt,
    StartedAt,
    EndedAt,
    ExpiresAt,
}
