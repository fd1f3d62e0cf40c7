use super::{SessionSummary, authorize_host, ensure_well_formed};
use crate::error::ApiError;
use crate::hub::session::participant_payload;
use crate::hub::{Hub, HubEvent, session_group, usertoken_group};
use crate::store::{CanvasStore, NewParticipant};
use crate::token::{TokenKind, waiting_room_path};
use crate::utils::generate_request_id;
use actix_web::{HttpResponse, delete, get, post, web};
use chrono::{DateTime, Utc};
use entity::participant;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 8, max = 9))]
    pub token: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email, length(max = 255))]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub country: String,
    #[validate(length(max = 100))]
    pub city: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeQuery {
    pub user_guid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostTokenQuery {
    pub host_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub user_guid: String,
    pub name: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl From<&participant::Model> for ParticipantView {
    fn from(p: &participant::Model) -> Self {
        Self {
            user_guid: p.user_guid.clone(),
            name: p.name.clone(),
            country: p.country.clone(),
            city: p.city.clone(),
            joined_at: p.joined_at,
            last_seen_at: p.last_seen_at,
        }
    }
}

async fn session_for_user_token(
    store: &CanvasStore,
    token: &str,
) -> Result<entity::session::Model, ApiError> {
    ensure_well_formed(token)?;
    store
        .validate_token(token, TokenKind::User)
        .await?
        .ok_or_else(|| ApiError::NotFound("Invalid or expired session token".into()))
}

#[get("/session/{token}/validate")]
pub async fn validate_session(
    store: web::Data<CanvasStore>,
    token: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let token = token.into_inner();
    let session = session_for_user_token(&store, &token).await?;
    let summary = SessionSummary::load(&store, &session).await?;

    Ok(HttpResponse::Ok().json(json!({
        "valid": true,
        "sessionId": session.session_id,
        "token": session.user_token,
        "expiresAt": session.expires_at,
        "session": summary,
        "participant": { "joinUrl": waiting_room_path(&session.user_token) },
        "requestId": generate_request_id(),
    })))
}

#[post("/register-with-token")]
pub async fn register_with_token(
    store: web::Data<CanvasStore>,
    hub: web::Data<Hub>,
    req: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = req.into_inner();
    req.validate()?;
    if req.name.trim().is_empty() || req.country.trim().is_empty() {
        return Err(ApiError::BadRequest("Name and country are required".into()));
    }

    let session = session_for_user_token(&store, &req.token).await?;
    let (participant, created) = store
        .register_participant(
            session.session_id,
            &session.user_token,
            NewParticipant {
                name: req.name,
                email: Some(req.email),
                country: Some(req.country),
                city: req.city,
            },
        )
        .await?;
    if !participant.is_active {
        return Err(ApiError::Forbidden("Participant has been deactivated".into()));
    }

    let request_id = generate_request_id();
    info!(
        "[{}] Participant {} {} session {}",
        request_id,
        participant.user_guid,
        if created { "joined" } else { "rejoined" },
        session.session_id
    );

    let event = HubEvent::new(
        "ParticipantJoined",
        json!({
            "sessionId": session.session_id,
            "participant": participant_payload(&participant),
        }),
    );
    hub.notify_group(&usertoken_group(&session.user_token), event.clone())
        .await;
    hub.notify_group(&session_group(session.session_id), event)
        .await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "sessionId": session.session_id,
        "userGuid": participant.user_guid,
        "waitingRoomUrl": waiting_room_path(&session.user_token),
        "requestId": request_id,
    })))
}

#[get("/session/{token}/participants")]
pub async fn list_participants(
    store: web::Data<CanvasStore>,
    token: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let session = session_for_user_token(&store, &token).await?;
    let participants: Vec<ParticipantView> = store
        .participants_for_session(session.session_id)
        .await?
        .iter()
        .map(ParticipantView::from)
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "sessionId": session.session_id,
        "participantCount": participants.len(),
        "participants": participants,
        "requestId": generate_request_id(),
    })))
}

#[get("/session/{token}/me")]
pub async fn current_participant(
    store: web::Data<CanvasStore>,
    token: web::Path<String>,
    query: web::Query<MeQuery>,
) -> Result<HttpResponse, ApiError> {
    let session = session_for_user_token(&store, &token).await?;
    let participant = store
        .touch_participant(session.session_id, &query.user_guid)
        .await?
        .ok_or_else(|| ApiError::NotFound("Participant is not registered for this session".into()))?;

    Ok(HttpResponse::Ok().json(json!({
        "sessionId": session.session_id,
        "participant": ParticipantView::from(&participant),
        "email": participant.email,
        "requestId": generate_request_id(),
    })))
}

#[delete("/session/{token}/participants")]
pub async fn delete_participants(
    store: web::Data<CanvasStore>,
    hub: web::Data<Hub>,
    token: web::Path<String>,
    query: web::Query<HostTokenQuery>,
) -> Result<HttpResponse, ApiError> {
    let token = token.into_inner();
    ensure_well_formed(&token)?;
    let session = store
        .find_by_user_token(&token)
        .await?
        .ok_or_else(|| ApiError::NotFound("Session not found".into()))?;
    authorize_host(&store, session.session_id, &query.host_token).await?;

    let deleted = store.delete_participants_by_token(&session.user_token).await?;
    info!("Removed {} participants from session {}", deleted, session.session_id);
    hub.notify_group(
        &session_group(session.session_id),
        HubEvent::new(
            "ParticipantsCleared",
            json!({ "sessionId": session.session_id, "count": deleted }),
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({
        "deleted": deleted,
        "sessionId": session.session_id,
        "requestId": generate_request_id(),
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(validate_session)
        .service(register_with_token)
        .service(list_participants)
        .service(current_participant)
        .service(delete_participants);
}
