//! Host provisioning: binds a library session to a canvas session and hands
//! out the host GUID and token pair.

use crate::ServiceError;
use crate::config::ServiceConfig;
use crate::store::{CanvasStore, NewParticipant, NewSession};
use crate::token::{hash_host_guid, host_url, participant_url};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct CreateHost {
    pub session_id: i64,
    pub created_by: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub create_user: bool,
    pub dry_run: bool,
}

/// What the operator needs to hand to the host. Tokens are absent on a dry run.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub session_id: i64,
    pub host_guid: String,
    pub host_token: Option<String>,
    pub user_token: Option<String>,
    pub host_url: Option<String>,
    pub participant_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub provisioner_guid: Option<String>,
}

impl Provisioned {
    fn dry_run(session_id: i64, host_guid: String) -> Self {
        Self {
            session_id,
            host_guid,
            host_token: None,
            user_token: None,
            host_url: None,
            participant_url: None,
            expires_at: None,
            provisioner_guid: None,
        }
    }
}

/// `YYYY-MM-DD`, read as the last second of that day in UTC.
pub fn parse_expiry(value: &str) -> Result<DateTime<Utc>, ServiceError> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| ServiceError::Validation(format!("Invalid expiry date '{}': {}", value, e)))?;
    let end_of_day = date
        .and_hms_opt(23, 59, 59)
        .ok_or_else(|| ServiceError::Validation(format!("Invalid expiry date '{}'", value)))?;
    Ok(end_of_day.and_utc())
}

fn new_host_guid(config: &ServiceConfig) -> Result<(String, String), ServiceError> {
    let guid = Uuid::new_v4().to_string();
    let hash = hash_host_guid(&config.host_secret, &guid)?;
    Ok((guid, hash))
}

/// Dry run without a database: draws a GUID and checks the host secret can
/// hash it. Session and transcript checks are skipped.
pub fn preview_host(config: &ServiceConfig, session_id: i64) -> Result<Provisioned, ServiceError> {
    let (host_guid, _) = new_host_guid(config)?;
    Ok(Provisioned::dry_run(session_id, host_guid))
}

pub struct Provisioner {
    store: CanvasStore,
    config: ServiceConfig,
}

impl Provisioner {
    pub fn new(store: CanvasStore, config: ServiceConfig) -> Self {
        Self { store, config }
    }

    pub async fn create_host(&self, request: CreateHost) -> Result<Provisioned, ServiceError> {
        let library = self
            .store
            .library_session(request.session_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Library session {} not found", request.session_id))
            })?;
        if !library.has_transcript() {
            return Err(ServiceError::Validation(format!(
                "Library session {} has no transcript",
                request.session_id
            )));
        }

        if request.dry_run {
            info!("Dry run: would provision session {}", request.session_id);
            return preview_host(&self.config, request.session_id);
        }
        let (host_guid, guid_hash) = new_host_guid(&self.config)?;

        let expires_at = match request.expires_at {
            Some(at) if at <= Utc::now() => {
                return Err(ServiceError::Validation("Expiry must be in the future".into()));
            }
            Some(at) => at,
            None => Utc::now() + Duration::hours(self.config.token_ttl_hours),
        };

        let session = match self.store.find_session(request.session_id).await? {
            Some(_) => {
                self.store
                    .reprovision_host(request.session_id, guid_hash, expires_at)
                    .await?
            }
            None => {
                self.store
                    .create_session(NewSession {
                        session_id: request.session_id,
                        title: Some(library.name.clone()),
                        description: library.description.clone(),
                        created_by: request.created_by.clone(),
                        host_guid_hash: Some(guid_hash),
                        expires_at,
                    })
                    .await?
            }
        };

        let provisioner_guid = if request.create_user {
            let (participant, _) = self
                .store
                .register_participant(
                    session.session_id,
                    &session.user_token,
                    NewParticipant {
                        name: request
                            .created_by
                            .clone()
                            .unwrap_or_else(|| "Host Provisioner".to_string()),
                        email: None,
                        country: None,
                        city: None,
                    },
                )
                .await?;
            Some(participant.user_guid)
        } else {
            None
        };

        let base = self.config.base_url();
        info!("Provisioned host for session {}", session.session_id);
        Ok(Provisioned {
            session_id: session.session_id,
            host_guid,
            host_url: Some(host_url(base, &session.host_token)),
            participant_url: Some(participant_url(base, &session.user_token)),
            host_token: Some(session.host_token),
            user_token: Some(session.user_token),
            expires_at: session.expires_at,
            provisioner_guid,
        })
    }

    /// Issues a new host GUID and host token. The old pair stops validating.
    pub async fn rotate_host(&self, session_id: i64, dry_run: bool) -> Result<Provisioned, ServiceError> {
        if self.store.find_session(session_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!("Session {} not found", session_id)));
        }

        if dry_run {
            return preview_host(&self.config, session_id);
        }
        let (host_guid, guid_hash) = new_host_guid(&self.config)?;

        let session = self
            .store
            .rotate_host_credentials(session_id, guid_hash)
            .await?;
        let base = self.config.base_url();
        info!("Rotated host credentials for session {}", session_id);
        Ok(Provisioned {
            session_id,
            host_guid,
            host_url: Some(host_url(base, &session.host_token)),
            participant_url: Some(participant_url(base, &session.user_token)),
            host_token: Some(session.host_token),
            user_token: Some(session.user_token),
            expires_at: session.expires_at,
            provisioner_guid: None,
        })
    }
}
