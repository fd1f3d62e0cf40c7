//! JSON HTTP API. Each submodule owns one scope.

pub mod admin;
pub mod annotations;
pub mod health;
pub mod host;
pub mod participant;
pub mod question;
pub mod session;
pub mod token;

use crate::error::ApiError;
use crate::store::CanvasStore;
use crate::token::{TokenKind, is_well_formed};
use actix_web::web;
use chrono::{DateTime, Utc};
use entity::session as session_entity;
use serde::Serialize;
use tracing::warn;

/// Session fields exposed to hosts and participants.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub participant_count: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub scheduled_duration: Option<String>,
}

impl SessionSummary {
    pub async fn load(
        store: &CanvasStore,
        session: &session_entity::Model,
    ) -> Result<Self, ApiError> {
        let participant_count = store.count_participants(session.session_id).await?;
        Ok(Self {
            session_id: session.session_id,
            title: session.title.clone(),
            description: session.description.clone(),
            status: session.status.clone(),
            participant_count,
            created_at: session.created_at,
            started_at: session.started_at,
            ended_at: session.ended_at,
            expires_at: session.expires_at,
            scheduled_date: session.scheduled_date.clone(),
            scheduled_time: session.scheduled_time.clone(),
            scheduled_duration: session.scheduled_duration.clone(),
        })
    }
}

pub(crate) fn ensure_well_formed(token: &str) -> Result<(), ApiError> {
    if token.trim().is_empty() {
        return Err(ApiError::BadRequest("Token is required".into()));
    }
    if !is_well_formed(token) {
        return Err(ApiError::BadRequest("Invalid token format".into()));
    }
    Ok(())
}

/// Loads session `session_id` and checks that `host_token` is its current,
/// unexpired host token.
pub(crate) async fn authorize_host(
    store: &CanvasStore,
    session_id: i64,
    host_token: &str,
) -> Result<session_entity::Model, ApiError> {
    if store.find_session(session_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Session {} not found", session_id)));
    }
    match store.validate_token(host_token.trim(), TokenKind::Host).await? {
        Some(session) if session.session_id == session_id => Ok(session),
        _ => {
            warn!("Rejected host token for session {}", session_id);
            Err(ApiError::Unauthorized(
                "Host token is not valid for this session".into(),
            ))
        }
    }
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(256 * 1024)
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into())
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(path_config())
        .service(web::scope("/api/host").configure(host::configure))
        .service(web::scope("/api/participant").configure(participant::configure))
        .service(web::scope("/api/question").configure(question::configure))
        .service(web::scope("/api/annotations").configure(annotations::configure))
        .service(web::scope("/api/token").configure(token::configure))
        .service(web::scope("/api/session").configure(session::configure))
        .service(web::scope("/api/admin").configure(admin::configure))
        .configure(health::configure);
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::config::ServiceConfig;
    use crate::hub::Hub;
    use crate::store::testing::memory_store;
    use crate::store::{CanvasStore, NewSession};
    use actix_web::web;
    use chrono::{Duration, Utc};
    use entity::session;

    pub(crate) fn test_config() -> ServiceConfig {
        ServiceConfig {
            database_url: "sqlite::memory:".into(),
            bind_address: "127.0.0.1:0".into(),
            host_secret: "test-secret".into(),
            token_ttl_hours: 24,
            public_base_url: "https://canvas.test".into(),
            environment: "Development".into(),
            db_connect_attempts: 1,
            expiry_sweep_secs: 300,
            admin_guid_hash: None,
        }
    }

    pub(crate) struct TestState {
        pub store: CanvasStore,
        pub hub: Hub,
        pub config: ServiceConfig,
    }

    impl TestState {
        pub(crate) async fn new() -> Self {
            Self {
                store: memory_store().await,
                hub: Hub::new(),
                config: test_config(),
            }
        }

        pub(crate) fn data(
            &self,
        ) -> (
            web::Data<CanvasStore>,
            web::Data<Hub>,
            web::Data<ServiceConfig>,
        ) {
            (
                web::Data::new(self.store.clone()),
                web::Data::new(self.hub.clone()),
                web::Data::new(self.config.clone()),
            )
        }

        pub(crate) async fn session(&self, session_id: i64) -> session::Model {
            self.store
                .create_session(NewSession {
                    session_id,
                    title: Some(format!("Session {}", session_id)),
                    description: Some("Test session".into()),
                    created_by: Some("tests".into()),
                    host_guid_hash: None,
                    expires_at: Utc::now() + Duration::hours(24),
                })
                .await
                .unwrap()
        }
    }

    /// Builds the full application around a test state.
    macro_rules! test_app {
        ($state:expr) => {{
            let (store, hub, config) = $state.data();
            actix_web::test::init_service(
                actix_web::App::new()
                    .app_data(store)
                    .app_data(hub)
                    .app_data(config)
                    .configure(crate::api::configure),
            )
            .await
        }};
    }
    pub(crate) use test_app;
}
