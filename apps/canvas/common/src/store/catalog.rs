use super::CanvasStore;
use crate::ServiceError;
use entity::{album, category, country, library_session};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

impl CanvasStore {
    pub async fn albums(&self) -> Result<Vec<album::Model>, ServiceError> {
        Ok(album::Entity::find()
            .filter(album::Column::IsActive.eq(true))
            .order_by_asc(album::Column::Name)
            .all(&self.db)
            .await?)
    }

    pub async fn categories(&self, album_id: i32) -> Result<Vec<category::Model>, ServiceError> {
        Ok(category::Entity::find()
            .filter(category::Column::AlbumId.eq(album_id))
            .order_by_asc(category::Column::SortOrder)
            .order_by_asc(category::Column::Name)
            .all(&self.db)
            .await?)
    }

    pub async fn library_sessions(
        &self,
        category_id: i32,
    ) -> Result<Vec<library_session::Model>, ServiceError> {
        Ok(library_session::Entity::find()
            .filter(library_session::Column::CategoryId.eq(category_id))
            .order_by_asc(library_session::Column::SessionDate)
            .order_by_asc(library_session::Column::SessionId)
            .all(&self.db)
            .await?)
    }

    pub async fn library_session(
        &self,
        session_id: i64,
    ) -> Result<Option<library_session::Model>, ServiceError> {
        Ok(library_session::Entity::find_by_id(session_id).one(&self.db).await?)
    }

    pub async fn countries(&self) -> Result<Vec<country::Model>, ServiceError> {
        Ok(country::Entity::find()
            .filter(country::Column::IsActive.eq(true))
            .order_by_asc(country::Column::Name)
            .all(&self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use crate::store::testing::{memory_store, seed_library};

    #[tokio::test]
    async fn test_countries_are_seeded_by_migration() {
        let store = memory_store().await;
        let countries = store.countries().await.unwrap();
        assert!(countries.len() >= 10);
        assert!(countries.iter().any(|c| c.iso2 == "PK"));
        let names: Vec<&str> = countries.iter().map(|c| c.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn test_catalog_cascade_lookups() {
        let store = memory_store().await;
        seed_library(&store, 100, Some("<p>hi</p>")).await;
        seed_library(&store, 101, None).await;

        let albums = store.albums().await.unwrap();
        assert_eq!(albums.len(), 1);
        let categories = store.categories(albums[0].album_id).await.unwrap();
        assert_eq!(categories.len(), 1);
        let sessions = store.library_sessions(categories[0].category_id).await.unwrap();
        assert_eq!(sessions.len(), 2);

        assert!(store.library_session(100).await.unwrap().unwrap().has_transcript());
        assert!(!store.library_session(101).await.unwrap().unwrap().has_transcript());
        assert!(store.categories(999).await.unwrap().is_empty());
    }
}
