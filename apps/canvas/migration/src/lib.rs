pub use sea_orm_migration::prelude::*;

mod m20250911_000001_create_catalog_tables;
mod m20250911_000002_create_sessions_table;
mod m20250911_000003_create_participants_table;
mod m20250911_000004_create_session_data_table;
mod m20250920_000001_create_session_assets_table;
mod m20251002_000001_index_sessions_host_guid_hash;
mod m20251002_000002_create_admin_sessions_table;
mod m20251002_000003_add_participants_is_active;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250911_000001_create_catalog_tables::Migration),
            Box::new(m20250911_000002_create_sessions_table::Migration),
            Box::new(m20250911_000003_create_participants_table::Migration),
            Box::new(m20250911_000004_create_session_data_table::Migration),
            Box::new(m20250920_000001_create_session_assets_table::Migration),
            Box::new(m20251002_000001_index_sessions_host_guid_hash::Migration),
            Box::new(m20251002_000002_create_admin_sessions_table::Migration),
            Box::new(m20251002_000003_add_participants_is_active::Migration),
        ]
    }
}
