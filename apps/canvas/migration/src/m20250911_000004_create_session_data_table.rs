use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SessionData::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SessionData::DataId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SessionData::SessionId).big_integer().not_null())
                    .col(ColumnDef::new(SessionData::DataType).string_len(20).not_null())
                    .col(ColumnDef::new(SessionData::Content).json().not_null())
                    .col(ColumnDef::new(SessionData::CreatedBy).string_len(100))
                    .col(ColumnDef::new(SessionData::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(SessionData::IsDeleted).boolean().not_null().default(false))
                    .foreign_key(
                        ForeignKey::create()
                            .name("FK_session_data_session_id")
                            .from(SessionData::Table, SessionData::SessionId)
                            .to(Sessions::Table, Sessions::SessionId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("IX_session_data_session_type")
                    .table(SessionData::Table)
                    .col(SessionData::SessionId)
                    .col(SessionData::DataType)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("IX_session_data_query")
                    .table(SessionData::Table)
                    .col(SessionData::SessionId)
                    .col(SessionData::DataType)
                    .col(SessionData::IsDeleted)
                    .col(SessionData::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SessionData::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SessionData {
    Table,
    DataId,
    SessionId,
    DataType,
    Content,
    CreatedBy,
    CreatedAt,
    IsDeleted,
}

#[derive(DeriveIden)]
enum Sessions {
    Table,
    SessionId,
}
