use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Albums::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Albums::AlbumId).integer().not_null().primary_key())
                    .col(ColumnDef::new(Albums::Name).string_len(200).not_null())
                    .col(ColumnDef::new(Albums::IsActive).boolean().not_null().default(true))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Categories::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Categories::CategoryId).integer().not_null().primary_key())
                    .col(ColumnDef::new(Categories::AlbumId).integer().not_null())
                    .col(ColumnDef::new(Categories::Name).string_len(200).not_null())
                    .col(ColumnDef::new(Categories::SortOrder).integer().not_null().default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("FK_categories_album_id")
                            .from(Categories::Table, Categories::AlbumId)
                            .to(Albums::Table, Albums::AlbumId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LibrarySessions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(LibrarySessions::SessionId).big_integer().not_null().primary_key())
                    .col(ColumnDef::new(LibrarySessions::CategoryId).integer().not_null())
                    .col(ColumnDef::new(LibrarySessions::Name).string_len(200).not_null())
                    .col(ColumnDef::new(LibrarySessions::Description).string_len(500))
                    .col(ColumnDef::new(LibrarySessions::SpeakerName).string_len(200))
                    .col(ColumnDef::new(LibrarySessions::SessionDate).timestamp_with_time_zone())
                    .col(ColumnDef::new(LibrarySessions::Transcript).text())
                    .foreign_key(
                        ForeignKey::create()
                            .name("FK_library_sessions_category_id")
                            .from(LibrarySessions::Table, LibrarySessions::CategoryId)
                            .to(Categories::Table, Categories::CategoryId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Countries::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Countries::Iso2).string_len(2).not_null().primary_key())
                    .col(ColumnDef::new(Countries::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Countries::IsActive).boolean().not_null().default(true))
                    .to_owned(),
            )
            .await?;

        let insert_sql = r#"
        INSERT INTO countries (iso2, name, is_active)
        VALUES
            ('AE', 'United Arab Emirates', TRUE),
            ('AU', 'Australia', TRUE),
            ('BD', 'Bangladesh', TRUE),
            ('CA', 'Canada', TRUE),
            ('DE', 'Germany', TRUE),
            ('EG', 'Egypt', TRUE),
            ('FR', 'France', TRUE),
            ('GB', 'United Kingdom', TRUE),
            ('ID', 'Indonesia', TRUE),
            ('IN', 'India', TRUE),
            ('MY', 'Malaysia', TRUE),
            ('NG', 'Nigeria', TRUE),
            ('PK', 'Pakistan', TRUE),
            ('SA', 'Saudi Arabia', TRUE),
            ('TR', 'Turkey', TRUE),
            ('US', 'United States', TRUE)
        ON CONFLICT DO NOTHING;
        "#;

        manager
            .get_connection()
            .execute_unprepared(insert_sql)
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Countries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LibrarySessions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Categories::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Albums::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Albums {
    Table,
    AlbumId,
    Name,
    IsActive,
}

#[derive(DeriveIden)]
enum Categories {
    Table,
    CategoryId,
    AlbumId,
    Name,
    SortOrder,
}

#[derive(DeriveIden)]
enum LibrarySessions {
    Table,
    SessionId,
    CategoryId,
    Name,
    Description,
    SpeakerName,
    SessionDate,
    Transcript,
}

#[derive(DeriveIden)]
enum Countries {
    Table,
    Iso2,
    Name,
    IsActive,
}
