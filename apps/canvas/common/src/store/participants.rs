use super::CanvasStore;
use crate::ServiceError;
use chrono::Utc;
use entity::participant;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Set,
};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub name: String,
    pub email: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

fn normalize_email(email: Option<String>) -> Option<String> {
    email
        .map(|e| e.trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
}

impl CanvasStore {
    /// Inserts the participant, or refreshes the row already registered in this
    /// session under the same email or name. The bool is true for a new row.
    pub async fn register_participant(
        &self,
        session_id: i64,
        user_token: &str,
        new: NewParticipant,
    ) -> Result<(participant::Model, bool), ServiceError> {
        let name = new.name.trim().to_string();
        let email = normalize_email(new.email);

        let mut identity = Condition::any().add(participant::Column::Name.eq(name.as_str()));
        if let Some(email) = &email {
            identity = identity.add(participant::Column::Email.eq(email.as_str()));
        }

        let existing = participant::Entity::find()
            .filter(participant::Column::SessionId.eq(session_id))
            .filter(identity)
            .order_by_asc(participant::Column::ParticipantId)
            .one(&self.db)
            .await?;

        let now = Utc::now();
        if let Some(existing) = existing {
            let mut active: participant::ActiveModel = existing.into();
            active.name = Set(Some(name));
            active.email = Set(email);
            active.country = Set(new.country);
            active.city = Set(new.city);
            active.user_token = Set(Some(user_token.to_string()));
            active.last_seen_at = Set(Some(now));
            return Ok((active.update(&self.db).await?, false));
        }

        let model = participant::ActiveModel {
            session_id: Set(session_id),
            user_guid: Set(Uuid::new_v4().to_string()),
            user_token: Set(Some(user_token.to_string())),
            name: Set(Some(name)),
            email: Set(email),
            country: Set(new.country),
            city: Set(new.city),
            joined_at: Set(now),
            last_seen_at: Set(Some(now)),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        info!(
            "Registered participant {} in session {}",
            model.user_guid, session_id
        );
        Ok((model, true))
    }

    pub async fn participants_for_session(
        &self,
        session_id: i64,
    ) -> Result<Vec<participant::Model>, ServiceError> {
        Ok(participant::Entity::find()
            .filter(participant::Column::SessionId.eq(session_id))
            .order_by_asc(participant::Column::JoinedAt)
            .order_by_asc(participant::Column::ParticipantId)
            .all(&self.db)
            .await?)
    }

    pub async fn participants_for_user_token(
        &self,
        user_token: &str,
    ) -> Result<Vec<participant::Model>, ServiceError> {
        Ok(participant::Entity::find()
            .filter(participant::Column::UserToken.eq(user_token.to_ascii_uppercase()))
            .order_by_asc(participant::Column::JoinedAt)
            .order_by_asc(participant::Column::ParticipantId)
            .all(&self.db)
            .await?)
    }

    pub async fn count_participants(&self, session_id: i64) -> Result<u64, ServiceError> {
        Ok(participant::Entity::find()
            .filter(participant::Column::SessionId.eq(session_id))
            .count(&self.db)
            .await?)
    }

    /// Active participant registered in `session_id` under `user_guid`.
    pub async fn find_participant(
        &self,
        session_id: i64,
        user_guid: &str,
    ) -> Result<Option<participant::Model>, ServiceError> {
        Ok(participant::Entity::find()
            .filter(participant::Column::SessionId.eq(session_id))
            .filter(participant::Column::UserGuid.eq(user_guid))
            .filter(participant::Column::IsActive.eq(true))
            .one(&self.db)
            .await?)
    }

    /// One page of participants across all sessions, newest first, with the total count.
    pub async fn participants_page(
        &self,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<participant::Model>, u64), ServiceError> {
        let paginator = participant::Entity::find()
            .order_by_desc(participant::Column::JoinedAt)
            .order_by_desc(participant::Column::ParticipantId)
            .paginate(&self.db, page_size);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((rows, total))
    }

    /// Locks a participant out of questions and hub activity. Returns the rows changed.
    pub async fn deactivate_participant(&self, user_guid: &str) -> Result<u64, ServiceError> {
        let result = participant::Entity::update_many()
            .col_expr(participant::Column::IsActive, Expr::value(false))
            .filter(participant::Column::UserGuid.eq(user_guid))
            .exec(&self.db)
            .await?;
        if result.rows_affected > 0 {
            info!("Deactivated participant {}", user_guid);
        }
        Ok(result.rows_affected)
    }

    pub async fn touch_participant(
        &self,
        session_id: i64,
        user_guid: &str,
    ) -> Result<Option<participant::Model>, ServiceError> {
        let Some(existing) = self.find_participant(session_id, user_guid).await? else {
            return Ok(None);
        };
        let mut active: participant::ActiveModel = existing.into();
        active.last_seen_at = Set(Some(Utc::now()));
        Ok(Some(active.update(&self.db).await?))
    }

    pub async fn delete_participants_by_token(&self, user_token: &str) -> Result<u64, ServiceError> {
        let result = participant::Entity::delete_many()
            .filter(participant::Column::UserToken.eq(user_token.to_ascii_uppercase()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
