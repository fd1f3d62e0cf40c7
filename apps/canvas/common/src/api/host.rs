use super::{SessionSummary, authorize_host, ensure_well_formed};
use crate::assets::{AssetType, detect_assets};
use crate::config::ServiceConfig;
use crate::error::ApiError;
use crate::hub::{Hub, HubEvent, host_group, session_group};
use crate::store::{CanvasStore, SessionSchedule};
use crate::token::{
    TokenKind, hash_host_guid, host_url, is_well_formed, participant_url, verify_host_guid,
};
use crate::utils::generate_request_id;
use crate::SessionDataType;
use actix_web::{HttpResponse, get, post, web};
use chrono::{DateTime, Utc};
use entity::session_asset;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[validate(length(min = 8, max = 9))]
    pub host_token: String,
    pub album_id: i32,
    pub category_id: i32,
    #[validate(range(min = 1))]
    pub session_id: i64,
    pub session_date: Option<String>,
    pub session_time: Option<String>,
    pub session_duration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostAuthRequest {
    #[serde(default)]
    pub host_guid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostTokenQuery {
    pub host_token: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DetectAssetsRequest {
    pub host_token: String,
    #[validate(length(max = 2_000_000))]
    pub html: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetsQuery {
    #[serde(rename = "type")]
    pub asset_type: Option<String>,
    #[serde(default)]
    pub shared_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct AssetPayload {
    #[serde(rename = "type")]
    pub asset_type: String,
    pub selector: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareAssetRequest {
    pub session_id: i64,
    pub host_token: String,
    pub asset_payload: AssetPayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetView {
    pub asset_id: i32,
    pub asset_type: String,
    pub selector: String,
    pub data_asset_id: String,
    pub css_selector: String,
    pub position: Option<i32>,
    pub css_pattern: Option<String>,
    pub is_shared: bool,
    pub shared_at: Option<DateTime<Utc>>,
    pub detected_at: DateTime<Utc>,
}

impl From<&session_asset::Model> for AssetView {
    fn from(a: &session_asset::Model) -> Self {
        Self {
            asset_id: a.asset_id,
            asset_type: a.asset_type.clone(),
            selector: a.asset_selector.clone(),
            data_asset_id: a.data_asset_id(),
            css_selector: a.css_selector(),
            position: a.position,
            css_pattern: a.css_pattern.clone(),
            is_shared: a.is_shared(),
            shared_at: a.shared_at,
            detected_at: a.detected_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAssetsResponse {
    pub session_id: i64,
    pub total_assets: usize,
    pub shared_assets: usize,
    pub assets_by_type: BTreeMap<String, usize>,
    pub assets: Vec<AssetView>,
    pub request_id: String,
}

impl SessionAssetsResponse {
    fn new(session_id: i64, assets: &[session_asset::Model]) -> Self {
        let mut assets_by_type = BTreeMap::new();
        for asset in assets {
            *assets_by_type.entry(asset.asset_type.clone()).or_insert(0) += 1;
        }
        Self {
            session_id,
            total_assets: assets.len(),
            shared_assets: assets.iter().filter(|a| a.is_shared()).count(),
            assets_by_type,
            assets: assets.iter().map(AssetView::from).collect(),
            request_id: generate_request_id(),
        }
    }
}

/// Exchanges the host GUID printed by the provisioner for the session's host token.
#[post("/authenticate")]
pub async fn authenticate_host(
    store: web::Data<CanvasStore>,
    config: web::Data<ServiceConfig>,
    req: web::Json<HostAuthRequest>,
) -> Result<HttpResponse, ApiError> {
    let guid = req.host_guid.trim();
    if guid.is_empty() {
        return Err(ApiError::BadRequest("Host GUID is required".into()));
    }
    let guid = Uuid::parse_str(guid)
        .map_err(|_| ApiError::BadRequest("Invalid GUID format".into()))?
        .to_string();

    let rejected = || ApiError::Unauthorized("Invalid host credentials".into());
    let hash = hash_host_guid(&config.host_secret, &guid)?;
    let session = store
        .find_by_host_guid_hash(&hash)
        .await?
        .ok_or_else(rejected)?;
    let stored_hash = session.host_guid_hash.as_deref().unwrap_or_default();
    if !verify_host_guid(&config.host_secret, &guid, stored_hash)? {
        return Err(rejected());
    }
    let session = store
        .validate_token(&session.host_token, TokenKind::Host)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Host session has expired".into()))?;

    let summary = SessionSummary::load(&store, &session).await?;
    let request_id = generate_request_id();
    info!("[{}] Host authenticated for session {}", request_id, session.session_id);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "sessionId": session.session_id,
        "hostToken": session.host_token,
        "hostUrl": host_url(config.base_url(), &session.host_token),
        "expiresAt": session.expires_at,
        "session": summary,
        "requestId": request_id,
    })))
}

#[get("/token/{token}/validate")]
pub async fn validate_host_token(
    store: web::Data<CanvasStore>,
    token: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let token = token.into_inner();
    let request_id = generate_request_id();
    if !is_well_formed(&token) {
        return Ok(HttpResponse::Ok().json(json!({ "valid": false, "requestId": request_id })));
    }

    let Some(session) = store.validate_token(&token, TokenKind::Host).await? else {
        return Ok(HttpResponse::Ok().json(json!({ "valid": false, "requestId": request_id })));
    };
    let summary = SessionSummary::load(&store, &session).await?;

    Ok(HttpResponse::Ok().json(json!({
        "valid": true,
        "sessionId": session.session_id,
        "hostToken": session.host_token,
        "session": summary,
        "requestId": request_id,
    })))
}

#[post("/session/create")]
pub async fn create_session(
    store: web::Data<CanvasStore>,
    config: web::Data<ServiceConfig>,
    req: web::Json<CreateSessionRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = req.into_inner();
    req.validate()?;

    let session = authorize_host(&store, req.session_id, &req.host_token).await?;
    let title = store
        .library_session(session.session_id)
        .await?
        .map(|library| library.name);

    let session = store
        .configure_session(
            session.session_id,
            SessionSchedule {
                album_id: Some(req.album_id),
                category_id: Some(req.category_id),
                title,
                scheduled_date: req.session_date,
                scheduled_time: req.session_time,
                scheduled_duration: req.session_duration,
            },
        )
        .await?;
    let assets = store
        .sync_assets_from_library(session.session_id, Some("host"))
        .await?;

    let request_id = generate_request_id();
    info!(
        "[{}] Session {} configured with {} assets",
        request_id,
        session.session_id,
        assets.len()
    );

    Ok(HttpResponse::Ok().json(json!({
        "sessionId": session.session_id,
        "status": "Success",
        "joinLink": participant_url(config.base_url(), &session.user_token),
        "hostToken": session.host_token,
        "userToken": session.user_token,
        "requestId": request_id,
    })))
}

#[post("/session/{id}/start")]
pub async fn start_session(
    store: web::Data<CanvasStore>,
    hub: web::Data<Hub>,
    path: web::Path<i64>,
    query: web::Query<HostTokenQuery>,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    authorize_host(&store, session_id, &query.host_token).await?;
    let session = store.start_session(session_id).await?;
    let summary = SessionSummary::load(&store, &session).await?;

    hub.notify_group(
        &session_group(session_id),
        HubEvent::new(
            "SessionBegan",
            json!({ "sessionId": session_id, "startedAt": session.started_at }),
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "session": summary,
        "requestId": generate_request_id(),
    })))
}

#[post("/session/{id}/end")]
pub async fn end_session(
    store: web::Data<CanvasStore>,
    hub: web::Data<Hub>,
    path: web::Path<i64>,
    query: web::Query<HostTokenQuery>,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    authorize_host(&store, session_id, &query.host_token).await?;
    let session = store.end_session(session_id).await?;
    let summary = SessionSummary::load(&store, &session).await?;

    let event = HubEvent::new(
        "SessionEnded",
        json!({
            "sessionId": session_id,
            "reason": "Host ended session",
            "endedAt": session.ended_at,
        }),
    );
    hub.notify_group(&session_group(session_id), event.clone()).await;
    hub.notify_group(&host_group(session_id), event).await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "session": summary,
        "requestId": generate_request_id(),
    })))
}

#[get("/albums")]
pub async fn albums(store: web::Data<CanvasStore>) -> Result<HttpResponse, ApiError> {
    let albums: Vec<Value> = store
        .albums()
        .await?
        .into_iter()
        .map(|a| json!({ "albumId": a.album_id, "name": a.name }))
        .collect();
    Ok(HttpResponse::Ok().json(albums))
}

#[get("/categories/{album_id}")]
pub async fn categories(
    store: web::Data<CanvasStore>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let categories: Vec<Value> = store
        .categories(path.into_inner())
        .await?
        .into_iter()
        .map(|c| json!({ "categoryId": c.category_id, "albumId": c.album_id, "name": c.name }))
        .collect();
    Ok(HttpResponse::Ok().json(categories))
}

#[get("/sessions/{category_id}")]
pub async fn library_sessions(
    store: web::Data<CanvasStore>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let sessions: Vec<Value> = store
        .library_sessions(path.into_inner())
        .await?
        .into_iter()
        .map(|s| {
            json!({
                "sessionId": s.session_id,
                "categoryId": s.category_id,
                "name": s.name,
                "description": s.description,
                "speakerName": s.speaker_name,
                "sessionDate": s.session_date,
                "hasTranscript": s.has_transcript(),
            })
        })
        .collect();
    Ok(HttpResponse::Ok().json(sessions))
}

#[get("/countries")]
pub async fn countries(store: web::Data<CanvasStore>) -> Result<HttpResponse, ApiError> {
    let countries: Vec<Value> = store
        .countries()
        .await?
        .into_iter()
        .map(|c| json!({ "iso2": c.iso2, "name": c.name }))
        .collect();
    Ok(HttpResponse::Ok().json(countries))
}

#[get("/sessions/by-token/{host_token}")]
pub async fn session_by_host_token(
    store: web::Data<CanvasStore>,
    config: web::Data<ServiceConfig>,
    token: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let token = token.into_inner();
    ensure_well_formed(&token)?;
    let session = store
        .validate_token(&token, TokenKind::Host)
        .await?
        .ok_or_else(|| ApiError::NotFound("Invalid or expired host token".into()))?;
    let summary = SessionSummary::load(&store, &session).await?;

    Ok(HttpResponse::Ok().json(json!({
        "session": summary,
        "userToken": session.user_token,
        "joinLink": participant_url(config.base_url(), &session.user_token),
        "albumId": session.album_id,
        "categoryId": session.category_id,
        "requestId": generate_request_id(),
    })))
}

#[post("/sessions/{id}/assets/detect")]
pub async fn detect_session_assets(
    store: web::Data<CanvasStore>,
    path: web::Path<i64>,
    req: web::Json<DetectAssetsRequest>,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    let req = req.into_inner();
    req.validate()?;
    authorize_host(&store, session_id, &req.host_token).await?;

    let detected = detect_assets(&req.html);
    let stored = store
        .replace_detected_assets(session_id, &detected, Some("host"))
        .await?;

    Ok(HttpResponse::Ok().json(SessionAssetsResponse::new(session_id, &stored)))
}

#[get("/sessions/{id}/assets")]
pub async fn session_assets(
    store: web::Data<CanvasStore>,
    path: web::Path<i64>,
    query: web::Query<AssetsQuery>,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    let asset_type = match query.asset_type.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            AssetType::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown asset type '{}'", raw)))?,
        ),
    };
    if store.find_session(session_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Session {} not found", session_id)));
    }

    let assets = store
        .assets_for_session(session_id, asset_type, query.shared_only)
        .await?;
    Ok(HttpResponse::Ok().json(SessionAssetsResponse::new(session_id, &assets)))
}

#[post("/share-asset")]
pub async fn share_asset(
    store: web::Data<CanvasStore>,
    hub: web::Data<Hub>,
    req: web::Json<ShareAssetRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = req.into_inner();
    let payload = req.asset_payload;
    if payload.selector.trim().is_empty() || payload.asset_type.trim().is_empty() {
        return Err(ApiError::BadRequest("Asset type and selector are required".into()));
    }
    authorize_host(&store, req.session_id, &req.host_token).await?;

    let shared_at = Utc::now();
    let row = store
        .insert_data(
            req.session_id,
            SessionDataType::SharedAsset,
            json!({
                "assetType": payload.asset_type,
                "selector": payload.selector,
                "metadata": payload.metadata,
                "sharedAt": shared_at,
            }),
            Some("host"),
        )
        .await?;
    if store
        .mark_asset_shared(req.session_id, &payload.selector)
        .await?
        .is_none()
    {
        info!(
            "Shared selector {} is not a detected asset of session {}",
            payload.selector, req.session_id
        );
    }

    hub.notify_group(
        &session_group(req.session_id),
        HubEvent::new(
            "AssetShared",
            json!({
                "assetId": row.data_id,
                "sessionId": req.session_id,
                "assetType": payload.asset_type,
                "selector": payload.selector,
                "metadata": payload.metadata,
                "sharedAt": shared_at,
            }),
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "assetId": row.data_id,
        "message": "Asset shared",
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(authenticate_host)
        .service(validate_host_token)
        .service(create_session)
        .service(start_session)
        .service(end_session)
        .service(albums)
        .service(categories)
        .service(session_by_host_token)
        .service(detect_session_assets)
        .service(session_assets)
        .service(library_sessions)
        .service(countries)
        .service(share_asset);
}
