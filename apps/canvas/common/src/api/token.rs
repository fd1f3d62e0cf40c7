use super::{authorize_host, ensure_well_formed};
use crate::config::ServiceConfig;
use crate::error::ApiError;
use crate::store::CanvasStore;
use crate::token::{TokenKind, host_url};
use crate::utils::generate_request_id;
use actix_web::{HttpResponse, get, post, web};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateQuery {
    #[serde(default)]
    pub is_host: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuery {
    pub host_token: String,
    pub valid_hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostTokenQuery {
    pub host_token: String,
}

#[get("/validate/{token}")]
pub async fn validate_token(
    store: web::Data<CanvasStore>,
    token: web::Path<String>,
    query: web::Query<ValidateQuery>,
) -> Result<HttpResponse, ApiError> {
    let token = token.into_inner();
    ensure_well_formed(&token)?;
    let kind = TokenKind::from_is_host(query.is_host);
    let session = store
        .validate_token(&token, kind)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Invalid or expired {} token", kind.as_str())))?;

    Ok(HttpResponse::Ok().json(json!({
        "valid": true,
        "sessionId": session.session_id,
        "tokenType": kind.as_str(),
        "status": session.status,
        "expiresAt": session.expires_at,
        "requestId": generate_request_id(),
    })))
}

#[post("/generate/{session_id}")]
pub async fn generate_tokens(
    store: web::Data<CanvasStore>,
    config: web::Data<ServiceConfig>,
    path: web::Path<i64>,
    query: web::Query<GenerateQuery>,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    let valid_hours = query.valid_hours.unwrap_or(config.token_ttl_hours);
    if valid_hours <= 0 {
        return Err(ApiError::BadRequest("validHours must be positive".into()));
    }
    authorize_host(&store, session_id, &query.host_token).await?;

    let expires_at = Utc::now() + Duration::hours(valid_hours);
    let session = store.regenerate_tokens(session_id, expires_at).await?;
    info!(
        "Issued new tokens for session {} valid for {}h",
        session_id, valid_hours
    );

    let base = config.base_url();
    Ok(HttpResponse::Ok().json(json!({
        "sessionId": session.session_id,
        "hostToken": session.host_token,
        "userToken": session.user_token,
        "hostUrl": host_url(base, &session.host_token),
        "userUrl": format!("{}/session/{}", base, session.user_token),
        "expiresAt": session.expires_at,
        "requestId": generate_request_id(),
    })))
}

#[get("/session/{session_id}")]
pub async fn session_tokens(
    store: web::Data<CanvasStore>,
    path: web::Path<i64>,
    query: web::Query<HostTokenQuery>,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    let session = authorize_host(&store, session_id, &query.host_token).await?;

    Ok(HttpResponse::Ok().json(json!({
        "sessionId": session.session_id,
        "hostToken": session.host_token,
        "userToken": session.user_token,
        "status": session.status,
        "expiresAt": session.expires_at,
        "requestId": generate_request_id(),
    })))
}

#[post("/expire/{user_token}")]
pub async fn expire_token(
    store: web::Data<CanvasStore>,
    token: web::Path<String>,
    query: web::Query<HostTokenQuery>,
) -> Result<HttpResponse, ApiError> {
    let token = token.into_inner();
    ensure_well_formed(&token)?;
    let owner = store
        .find_by_user_token(&token)
        .await?
        .ok_or_else(|| ApiError::NotFound("No session uses this token".into()))?;
    authorize_host(&store, owner.session_id, &query.host_token).await?;
    let session = store
        .expire_user_token(&token)
        .await?
        .ok_or_else(|| ApiError::NotFound("No session uses this token".into()))?;
    info!("User token for session {} expired", session.session_id);

    Ok(HttpResponse::Ok().json(json!({
        "sessionId": session.session_id,
        "expired": true,
        "expiresAt": session.expires_at,
        "requestId": generate_request_id(),
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(validate_token)
        .service(generate_tokens)
        .service(session_tokens)
        .service(expire_token);
}
