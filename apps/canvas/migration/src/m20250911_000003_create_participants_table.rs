use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Participants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Participants::ParticipantId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Participants::SessionId).big_integer().not_null())
                    .col(ColumnDef::new(Participants::UserGuid).string_len(256).not_null())
                    .col(ColumnDef::new(Participants::UserToken).string_len(8))
                    .col(ColumnDef::new(Participants::Name).string_len(100))
                    .col(ColumnDef::new(Participants::Email).string_len(255))
                    .col(ColumnDef::new(Participants::Country).string_len(100))
                    .col(ColumnDef::new(Participants::City).string_len(100))
                    .col(ColumnDef::new(Participants::JoinedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Participants::LastSeenAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("FK_participants_session_id")
                            .from(Participants::Table, Participants::SessionId)
                            .to(Sessions::Table, Sessions::SessionId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("IX_participants_session_id")
                    .table(Participants::Table)
                    .col(Participants::SessionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("IX_participants_session_user")
                    .table(Participants::Table)
                    .col(Participants::SessionId)
                    .col(Participants::UserGuid)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Participants::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Participants {
    Table,
    ParticipantId,
    SessionId,
    UserGuid,
    UserToken,
    Name,
    Email,
    Country,
    City,
    JoinedAt,
    LastSeenAt,
}

#[derive(DeriveIden)]
enum Sessions {
    Table,
    SessionId,
}
