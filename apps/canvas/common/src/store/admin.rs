use super::CanvasStore;
use crate::ServiceError;
use crate::token::generate_admin_token;
use chrono::{Duration, Utc};
use entity::admin_session;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use tracing::info;

impl CanvasStore {
    pub async fn create_admin_session(
        &self,
        ttl: Duration,
    ) -> Result<admin_session::Model, ServiceError> {
        let now = Utc::now();
        let model = admin_session::ActiveModel {
            session_token: Set(generate_admin_token(&mut rand::rng())),
            created_at: Set(now),
            expires_at: Set(now + ttl),
            is_active: Set(true),
        }
        .insert(&self.db)
        .await?;
        info!("Admin session opened, expires {}", model.expires_at);
        Ok(model)
    }

    /// The admin session behind `token`, if it is active and unexpired.
    pub async fn validate_admin_session(
        &self,
        token: &str,
    ) -> Result<Option<admin_session::Model>, ServiceError> {
        Ok(admin_session::Entity::find_by_id(token.trim().to_string())
            .filter(admin_session::Column::IsActive.eq(true))
            .filter(admin_session::Column::ExpiresAt.gt(Utc::now()))
            .one(&self.db)
            .await?)
    }
}
