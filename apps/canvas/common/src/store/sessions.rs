use super::CanvasStore;
use crate::token::{self, MAX_GENERATION_ATTEMPTS, TokenKind};
use crate::{ServiceError, SessionStatus};
use chrono::{DateTime, Duration, Utc};
use entity::session;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Set,
};
use tracing::{debug, info};

/// Fields fixed when a session is first provisioned.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub host_guid_hash: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Host selections submitted from the session setup form.
#[derive(Debug, Clone, Default)]
pub struct SessionSchedule {
    pub album_id: Option<i32>,
    pub category_id: Option<i32>,
    pub title: Option<String>,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub scheduled_duration: Option<String>,
}

fn is_closed(model: &session::Model) -> bool {
    matches!(
        SessionStatus::parse(&model.status),
        Some(SessionStatus::Completed) | Some(SessionStatus::Expired)
    )
}

impl CanvasStore {
    pub async fn find_session(&self, session_id: i64) -> Result<Option<session::Model>, ServiceError> {
        Ok(session::Entity::find_by_id(session_id).one(&self.db).await?)
    }

    async fn require_session(&self, session_id: i64) -> Result<session::Model, ServiceError> {
        self.find_session(session_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Session {} not found", session_id)))
    }

    /// Returns the session the token opens, if it is neither expired nor marked `Expired`.
    pub async fn validate_token(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<Option<session::Model>, ServiceError> {
        let column = match kind {
            TokenKind::Host => session::Column::HostToken,
            TokenKind::User => session::Column::UserToken,
        };

        let found = session::Entity::find()
            .filter(column.eq(token.to_ascii_uppercase()))
            .filter(
                Condition::any()
                    .add(session::Column::ExpiresAt.is_null())
                    .add(session::Column::ExpiresAt.gt(Utc::now())),
            )
            .filter(session::Column::Status.ne(SessionStatus::Expired.as_str()))
            .one(&self.db)
            .await?;

        debug!(
            "Token validation ({}) for {}: {}",
            kind.as_str(),
            token,
            if found.is_some() { "valid" } else { "invalid" }
        );
        Ok(found)
    }

    /// Tries the token as a user token first, then as a host token.
    pub async fn find_by_any_token(
        &self,
        token: &str,
    ) -> Result<Option<(session::Model, TokenKind)>, ServiceError> {
        if let Some(found) = self.validate_token(token, TokenKind::User).await? {
            return Ok(Some((found, TokenKind::User)));
        }
        Ok(self
            .validate_token(token, TokenKind::Host)
            .await?
            .map(|found| (found, TokenKind::Host)))
    }

    /// Looks a session up by its user token with no expiry filtering.
    pub async fn find_by_user_token(&self, user_token: &str) -> Result<Option<session::Model>, ServiceError> {
        Ok(session::Entity::find()
            .filter(session::Column::UserToken.eq(user_token.to_ascii_uppercase()))
            .one(&self.db)
            .await?)
    }

    pub async fn find_by_host_guid_hash(
        &self,
        host_guid_hash: &str,
    ) -> Result<Option<session::Model>, ServiceError> {
        Ok(session::Entity::find()
            .filter(session::Column::HostGuidHash.eq(host_guid_hash))
            .one(&self.db)
            .await?)
    }

    /// One page of sessions, newest first, with the total count.
    pub async fn sessions_page(
        &self,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<session::Model>, u64), ServiceError> {
        let paginator = session::Entity::find()
            .order_by_desc(session::Column::CreatedAt)
            .order_by_desc(session::Column::SessionId)
            .paginate(&self.db, page_size);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((rows, total))
    }

    async fn token_in_use(&self, candidate: &str) -> Result<bool, ServiceError> {
        let count = session::Entity::find()
            .filter(
                Condition::any()
                    .add(session::Column::HostToken.eq(candidate))
                    .add(session::Column::UserToken.eq(candidate)),
            )
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    /// Draws tokens until one collides with neither column nor anything in `reserved`.
    async fn unique_token(&self, reserved: &[&str]) -> Result<String, ServiceError> {
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let candidate = token::generate_token(&mut rand::rng());
            if reserved.contains(&candidate.as_str()) {
                continue;
            }
            if !self.token_in_use(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(ServiceError::TokenExhausted(MAX_GENERATION_ATTEMPTS))
    }

    async fn unique_token_pair(&self) -> Result<(String, String), ServiceError> {
        let host_token = self.unique_token(&[]).await?;
        let user_token = self.unique_token(&[host_token.as_str()]).await?;
        Ok((host_token, user_token))
    }

    pub async fn create_session(&self, new: NewSession) -> Result<session::Model, ServiceError> {
        let (host_token, user_token) = self.unique_token_pair().await?;
        let now = Utc::now();

        let model = session::ActiveModel {
            session_id: Set(new.session_id),
            host_token: Set(host_token),
            user_token: Set(user_token),
            title: Set(new.title),
            description: Set(new.description),
            status: Set(SessionStatus::Created.as_str().to_string()),
            host_guid_hash: Set(new.host_guid_hash),
            album_id: Set(None),
            category_id: Set(None),
            scheduled_date: Set(None),
            scheduled_time: Set(None),
            scheduled_duration: Set(None),
            created_by: Set(new.created_by),
            created_at: Set(now),
            modified_at: Set(now),
            started_at: Set(None),
            ended_at: Set(None),
            expires_at: Set(Some(new.expires_at)),
        }
        .insert(&self.db)
        .await?;

        info!(
            "Created session {} (host token {}, user token {})",
            model.session_id, model.host_token, model.user_token
        );
        Ok(model)
    }

    /// Replaces both tokens and pushes the expiry out to `expires_at`.
    pub async fn regenerate_tokens(
        &self,
        session_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<session::Model, ServiceError> {
        self.reissue_tokens(session_id, expires_at, None).await
    }

    /// Re-provisions an existing session: new GUID hash, new token pair and
    /// expiry, written by a single update.
    pub async fn reprovision_host(
        &self,
        session_id: i64,
        host_guid_hash: String,
        expires_at: DateTime<Utc>,
    ) -> Result<session::Model, ServiceError> {
        self.reissue_tokens(session_id, expires_at, Some(host_guid_hash))
            .await
    }

    async fn reissue_tokens(
        &self,
        session_id: i64,
        expires_at: DateTime<Utc>,
        host_guid_hash: Option<String>,
    ) -> Result<session::Model, ServiceError> {
        let existing = self.require_session(session_id).await?;
        let (host_token, user_token) = self.unique_token_pair().await?;

        let mut active: session::ActiveModel = existing.into();
        active.host_token = Set(host_token);
        active.user_token = Set(user_token);
        active.expires_at = Set(Some(expires_at));
        if let Some(hash) = host_guid_hash {
            active.host_guid_hash = Set(Some(hash));
        }
        active.modified_at = Set(Utc::now());
        Ok(active.update(&self.db).await?)
    }

    /// New host token and GUID hash; the user token is left alone so shared links keep working.
    pub async fn rotate_host_credentials(
        &self,
        session_id: i64,
        host_guid_hash: String,
    ) -> Result<session::Model, ServiceError> {
        let existing = self.require_session(session_id).await?;
        let host_token = self.unique_token(&[existing.user_token.as_str()]).await?;

        let mut active: session::ActiveModel = existing.into();
        active.host_token = Set(host_token);
        active.host_guid_hash = Set(Some(host_guid_hash));
        active.modified_at = Set(Utc::now());
        Ok(active.update(&self.db).await?)
    }

    /// Backdates the expiry of the session behind `user_token` by a minute.
    pub async fn expire_user_token(&self, user_token: &str) -> Result<Option<session::Model>, ServiceError> {
        let Some(existing) = self.find_by_user_token(user_token).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        let mut active: session::ActiveModel = existing.into();
        active.expires_at = Set(Some(now - Duration::minutes(1)));
        active.modified_at = Set(now);
        Ok(Some(active.update(&self.db).await?))
    }

    pub async fn configure_session(
        &self,
        session_id: i64,
        schedule: SessionSchedule,
    ) -> Result<session::Model, ServiceError> {
        let existing = self.require_session(session_id).await?;
        if is_closed(&existing) {
            return Err(ServiceError::Validation(format!(
                "Session {} can no longer be configured",
                session_id
            )));
        }

        let was_active = existing.status == SessionStatus::Active.as_str();
        let mut active: session::ActiveModel = existing.into();
        active.album_id = Set(schedule.album_id);
        active.category_id = Set(schedule.category_id);
        if let Some(title) = schedule.title {
            active.title = Set(Some(title));
        }
        active.scheduled_date = Set(schedule.scheduled_date);
        active.scheduled_time = Set(schedule.scheduled_time);
        active.scheduled_duration = Set(schedule.scheduled_duration);
        if !was_active {
            active.status = Set(SessionStatus::Configured.as_str().to_string());
        }
        active.modified_at = Set(Utc::now());
        Ok(active.update(&self.db).await?)
    }

    pub async fn start_session(&self, session_id: i64) -> Result<session::Model, ServiceError> {
        let existing = self.require_session(session_id).await?;
        if is_closed(&existing) {
            return Err(ServiceError::Validation(format!(
                "Session {} has already ended",
                session_id
            )));
        }
        if existing.status == SessionStatus::Active.as_str() {
            return Ok(existing);
        }

        let now = Utc::now();
        let mut active: session::ActiveModel = existing.into();
        active.status = Set(SessionStatus::Active.as_str().to_string());
        active.started_at = Set(Some(now));
        active.modified_at = Set(now);
        let model = active.update(&self.db).await?;
        info!("Session {} started", session_id);
        Ok(model)
    }

    pub async fn end_session(&self, session_id: i64) -> Result<session::Model, ServiceError> {
        let existing = self.require_session(session_id).await?;
        if existing.ended_at.is_some() || is_closed(&existing) {
            return Err(ServiceError::Validation(format!(
                "Session {} has already ended",
                session_id
            )));
        }

        let now = Utc::now();
        let mut active: session::ActiveModel = existing.into();
        active.status = Set(SessionStatus::Completed.as_str().to_string());
        active.ended_at = Set(Some(now));
        active.modified_at = Set(now);
        let model = active.update(&self.db).await?;
        info!("Session {} ended", session_id);
        Ok(model)
    }

    /// Marks sessions past their expiry as `Expired`. Completed sessions keep their status.
    pub async fn expire_stale_sessions(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = session::Entity::update_many()
            .col_expr(
                session::Column::Status,
                sea_orm::sea_query::Expr::value(SessionStatus::Expired.as_str()),
            )
            .col_expr(session::Column::ModifiedAt, sea_orm::sea_query::Expr::value(now))
            .filter(session::Column::ExpiresAt.lt(now))
            .filter(
                session::Column::Status.is_not_in([
                    SessionStatus::Expired.as_str(),
                    SessionStatus::Completed.as_str(),
                ]),
            )
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn count_sessions(&self) -> Result<u64, ServiceError> {
        Ok(session::Entity::find().count(&self.db).await?)
    }

    pub async fn delete_session(&self, session_id: i64) -> Result<bool, ServiceError> {
        let result = session::Entity::delete_by_id(session_id).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::memory_store;

    fn new_session(session_id: i64) -> NewSession {
        NewSession {
            session_id,
            title: Some("Tafsir session".into()),
            description: None,
            created_by: Some("tests".into()),
            host_guid_hash: None,
            expires_at: Utc::now() + Duration::hours(24),
        }
    }

    #[tokio::test]
    async fn test_create_session_assigns_distinct_tokens() {
        let store = memory_store().await;
        let session = store.create_session(new_session(212)).await.unwrap();

        assert_eq!(session.status, "Created");
        assert!(token::is_well_formed(&session.host_token));
        assert!(token::is_well_formed(&session.user_token));
        assert_ne!(session.host_token, session.user_token);
    }

    #[tokio::test]
    async fn test_tokens_are_unique_across_sessions() {
        let store = memory_store().await;
        let mut seen = std::collections::HashSet::new();
        for id in 1..=20 {
            let s = store.create_session(new_session(id)).await.unwrap();
            assert!(seen.insert(s.host_token));
            assert!(seen.insert(s.user_token));
        }
    }

    #[tokio::test]
    async fn test_validate_token_matches_kind() {
        let store = memory_store().await;
        let session = store.create_session(new_session(5)).await.unwrap();

        let by_user = store.validate_token(&session.user_token, TokenKind::User).await.unwrap();
        assert_eq!(by_user.map(|s| s.session_id), Some(5));

        let wrong_kind = store.validate_token(&session.user_token, TokenKind::Host).await.unwrap();
        assert!(wrong_kind.is_none());

        let lower = session.host_token.to_ascii_lowercase();
        assert!(store.validate_token(&lower, TokenKind::Host).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_tokens_do_not_validate() {
        let store = memory_store().await;
        let session = store.create_session(new_session(6)).await.unwrap();

        let expired = store.expire_user_token(&session.user_token).await.unwrap().unwrap();
        assert!(expired.expires_at.unwrap() < Utc::now());
        assert!(
            store
                .validate_token(&session.user_token, TokenKind::User)
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.expire_user_token("NOPE2345").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_status_blocks_validation() {
        let store = memory_store().await;
        let session = store.create_session(new_session(7)).await.unwrap();
        let mut active: session::ActiveModel = session.clone().into();
        active.status = Set("Expired".into());
        active.update(store.connection()).await.unwrap();

        assert!(
            store
                .validate_token(&session.host_token, TokenKind::Host)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_find_by_any_token_reports_kind() {
        let store = memory_store().await;
        let session = store.create_session(new_session(8)).await.unwrap();

        let (_, kind) = store.find_by_any_token(&session.host_token).await.unwrap().unwrap();
        assert_eq!(kind, TokenKind::Host);
        let (_, kind) = store.find_by_any_token(&session.user_token).await.unwrap().unwrap();
        assert_eq!(kind, TokenKind::User);
        assert!(store.find_by_any_token("ZZZZ9999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_regenerate_tokens_invalidates_old_pair() {
        let store = memory_store().await;
        let original = store.create_session(new_session(9)).await.unwrap();
        let renewed = store
            .regenerate_tokens(9, Utc::now() + Duration::hours(2))
            .await
            .unwrap();

        assert_ne!(original.host_token, renewed.host_token);
        assert!(
            store
                .validate_token(&original.user_token, TokenKind::User)
                .await
                .unwrap()
                .is_none()
        );
        assert!(matches!(
            store.regenerate_tokens(404, Utc::now()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reprovision_writes_hash_and_tokens_together() {
        let store = memory_store().await;
        let original = store.create_session(new_session(15)).await.unwrap();
        let renewed = store
            .reprovision_host(15, "hash-b".into(), Utc::now() + Duration::hours(3))
            .await
            .unwrap();

        assert_eq!(renewed.host_guid_hash.as_deref(), Some("hash-b"));
        assert_ne!(renewed.user_token, original.user_token);
        let found = store.find_by_host_guid_hash("hash-b").await.unwrap().unwrap();
        assert_eq!(found.host_token, renewed.host_token);

        // a failed reissue leaves the stored hash untouched
        assert!(store.reprovision_host(404, "hash-c".into(), Utc::now()).await.is_err());
        assert!(store.find_by_host_guid_hash("hash-c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sessions_page_newest_first() {
        let store = memory_store().await;
        for id in [16, 17, 18] {
            store.create_session(new_session(id)).await.unwrap();
        }
        let (page, total) = store.sessions_page(1, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.iter().map(|s| s.session_id).collect::<Vec<_>>(), vec![18, 17]);
        let (rest, _) = store.sessions_page(2, 2).await.unwrap();
        assert_eq!(rest[0].session_id, 16);
    }

    #[tokio::test]
    async fn test_rotate_keeps_user_token() {
        let store = memory_store().await;
        let original = store.create_session(new_session(10)).await.unwrap();
        let rotated = store
            .rotate_host_credentials(10, "new-hash".into())
            .await
            .unwrap();

        assert_eq!(rotated.user_token, original.user_token);
        assert_ne!(rotated.host_token, original.host_token);
        assert_eq!(rotated.host_guid_hash.as_deref(), Some("new-hash"));
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let store = memory_store().await;
        store.create_session(new_session(11)).await.unwrap();

        let configured = store
            .configure_session(
                11,
                SessionSchedule {
                    album_id: Some(1),
                    category_id: Some(10),
                    scheduled_date: Some("2025-09-20".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(configured.status, "Configured");
        assert_eq!(configured.category_id, Some(10));

        let started = store.start_session(11).await.unwrap();
        assert_eq!(started.status, "Active");
        assert!(started.started_at.is_some());

        let ended = store.end_session(11).await.unwrap();
        assert_eq!(ended.status, "Completed");
        assert!(ended.ended_at.is_some());

        assert!(matches!(store.start_session(11).await, Err(ServiceError::Validation(_))));
        assert!(matches!(store.end_session(11).await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_expire_stale_sessions_skips_completed() {
        let store = memory_store().await;
        store.create_session(new_session(12)).await.unwrap();
        store.create_session(new_session(13)).await.unwrap();
        store.end_session(13).await.unwrap();

        let later = Utc::now() + Duration::hours(48);
        assert_eq!(store.expire_stale_sessions(later).await.unwrap(), 1);

        let s12 = store.find_session(12).await.unwrap().unwrap();
        let s13 = store.find_session(13).await.unwrap().unwrap();
        assert_eq!(s12.status, "Expired");
        assert_eq!(s13.status, "Completed");
    }

    #[tokio::test]
    async fn test_count_and_delete() {
        let store = memory_store().await;
        store.create_session(new_session(14)).await.unwrap();
        assert_eq!(store.count_sessions().await.unwrap(), 1);
        assert!(store.delete_session(14).await.unwrap());
        assert!(!store.delete_session(14).await.unwrap());
        assert_eq!(store.count_sessions().await.unwrap(), 0);
    }
}
