//! Database access for the canvas, one submodule per table group.

mod admin;
mod assets;
mod catalog;
mod participants;
mod questions;
mod session_data;
mod sessions;

pub use participants::NewParticipant;
pub use questions::{QuestionRecord, VoteDirection, VoteOutcome};
pub use session_data::OwnedChange;
pub use sessions::{NewSession, SessionSchedule};

use sea_orm::DatabaseConnection;

#[derive(Clone, Debug)]
pub struct CanvasStore {
    db: DatabaseConnection,
}

impl CanvasStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::CanvasStore;
    use chrono::Utc;
    use entity::{album, category, library_session};
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{ActiveModelTrait, ConnectOptions, Database, EntityTrait, Set};

    /// Fresh migrated in-memory SQLite database. A single pooled connection
    /// keeps the database alive for the whole test.
    pub(crate) async fn memory_store() -> CanvasStore {
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opts).await.expect("open sqlite memory db");
        Migrator::up(&db, None).await.expect("run migrations");
        CanvasStore::new(db)
    }

    /// Seeds album 1 / category 10 and one library session.
    pub(crate) async fn seed_library(store: &CanvasStore, session_id: i64, transcript: Option<&str>) {
        let db = store.connection();
        if album::Entity::find_by_id(1).one(db).await.unwrap().is_none() {
            album::ActiveModel {
                album_id: Set(1),
                name: Set("Tafsir".into()),
                is_active: Set(true),
            }
            .insert(db)
            .await
            .unwrap();
            category::ActiveModel {
                category_id: Set(10),
                album_id: Set(1),
                name: Set("Surah Al-Baqarah".into()),
                sort_order: Set(1),
            }
            .insert(db)
            .await
            .unwrap();
        }
        library_session::ActiveModel {
            session_id: Set(session_id),
            category_id: Set(10),
            name: Set(format!("Lecture {}", session_id)),
            description: Set(Some("Weekly lecture".into())),
            speaker_name: Set(Some("Speaker".into())),
            session_date: Set(Some(Utc::now())),
            transcript: Set(transcript.map(str::to_string)),
        }
        .insert(db)
        .await
        .unwrap();
    }
}
