use super::SessionSummary;
use super::participant::ParticipantView;
use crate::config::ServiceConfig;
use crate::error::ApiError;
use crate::hub::{Hub, HubEvent, host_group, session_group};
use crate::store::CanvasStore;
use crate::token::verify_host_guid;
use crate::utils::generate_request_id;
use actix_web::{HttpResponse, get, post, web};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

const ADMIN_SESSION_HOURS: i64 = 12;
const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAuthRequest {
    #[serde(default)]
    pub admin_guid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminQuery {
    pub session_token: String,
    #[serde(default = "first_page")]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

fn first_page() -> u64 {
    1
}

fn default_page_size() -> u64 {
    20
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminTokenQuery {
    pub session_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserView {
    pub session_id: i64,
    pub is_active: bool,
    #[serde(flatten)]
    pub participant: ParticipantView,
}

async fn require_admin(store: &CanvasStore, session_token: &str) -> Result<(), ApiError> {
    match store.validate_admin_session(session_token).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::Unauthorized("Admin session is invalid or expired".into())),
    }
}

fn page_bounds(query: &AdminQuery) -> Result<(u64, u64), ApiError> {
    if query.page == 0 || query.page_size == 0 || query.page_size > MAX_PAGE_SIZE {
        return Err(ApiError::BadRequest(format!(
            "page must be at least 1 and pageSize between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    Ok((query.page, query.page_size))
}

fn total_pages(total: u64, page_size: u64) -> u64 {
    total.div_ceil(page_size)
}

#[post("/authenticate")]
pub async fn authenticate_admin(
    store: web::Data<CanvasStore>,
    config: web::Data<ServiceConfig>,
    req: web::Json<AdminAuthRequest>,
) -> Result<HttpResponse, ApiError> {
    let guid = req.admin_guid.trim();
    if guid.is_empty() {
        return Err(ApiError::BadRequest("Admin GUID is required".into()));
    }
    let Some(expected) = config.admin_guid_hash.as_deref() else {
        warn!("Admin login attempted but no admin GUID hash is configured");
        return Err(ApiError::Unauthorized("Invalid admin credentials".into()));
    };
    if !verify_host_guid(&config.host_secret, guid, expected)? {
        warn!("Rejected admin GUID");
        return Err(ApiError::Unauthorized("Invalid admin credentials".into()));
    }

    let admin = store
        .create_admin_session(Duration::hours(ADMIN_SESSION_HOURS))
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "sessionToken": admin.session_token,
        "expiresAt": admin.expires_at,
        "requestId": generate_request_id(),
    })))
}

#[get("/sessions")]
pub async fn list_sessions(
    store: web::Data<CanvasStore>,
    query: web::Query<AdminQuery>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&store, &query.session_token).await?;
    let (page, page_size) = page_bounds(&query)?;

    let (rows, total) = store.sessions_page(page, page_size).await?;
    let mut sessions = Vec::with_capacity(rows.len());
    for session in &rows {
        sessions.push(SessionSummary::load(&store, session).await?);
    }

    Ok(HttpResponse::Ok().json(json!({
        "sessions": sessions,
        "totalCount": total,
        "page": page,
        "pageSize": page_size,
        "totalPages": total_pages(total, page_size),
        "requestId": generate_request_id(),
    })))
}

#[post("/session/{session_id}/terminate")]
pub async fn terminate_session(
    store: web::Data<CanvasStore>,
    hub: web::Data<Hub>,
    path: web::Path<i64>,
    query: web::Query<AdminTokenQuery>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&store, &query.session_token).await?;
    let session_id = path.into_inner();
    let session = store.end_session(session_id).await?;
    info!("Session {} terminated by an administrator", session_id);

    let event = HubEvent::new(
        "SessionEnded",
        json!({
            "sessionId": session_id,
            "reason": "Terminated by administrator",
            "endedAt": session.ended_at,
        }),
    );
    hub.notify_group(&session_group(session_id), event.clone()).await;
    hub.notify_group(&host_group(session_id), event).await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "sessionId": session_id,
        "status": session.status,
        "requestId": generate_request_id(),
    })))
}

#[get("/users")]
pub async fn list_users(
    store: web::Data<CanvasStore>,
    query: web::Query<AdminQuery>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&store, &query.session_token).await?;
    let (page, page_size) = page_bounds(&query)?;

    let (rows, total) = store.participants_page(page, page_size).await?;
    let users: Vec<AdminUserView> = rows
        .iter()
        .map(|p| AdminUserView {
            session_id: p.session_id,
            is_active: p.is_active,
            participant: ParticipantView::from(p),
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "users": users,
        "totalCount": total,
        "page": page,
        "pageSize": page_size,
        "totalPages": total_pages(total, page_size),
        "requestId": generate_request_id(),
    })))
}

#[post("/user/{user_guid}/deactivate")]
pub async fn deactivate_user(
    store: web::Data<CanvasStore>,
    path: web::Path<String>,
    query: web::Query<AdminTokenQuery>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&store, &query.session_token).await?;
    let user_guid = path.into_inner();
    if store.deactivate_participant(&user_guid).await? == 0 {
        return Err(ApiError::NotFound(format!("User {} not found", user_guid)));
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "userGuid": user_guid,
        "requestId": generate_request_id(),
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(authenticate_admin)
        .service(list_sessions)
        .service(terminate_session)
        .service(list_users)
        .service(deactivate_user);
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{TestState, test_app};
    use crate::hub::session_group;
    use crate::hub::testing::{drain, events};
    use crate::store::NewParticipant;
    use crate::token::hash_host_guid;
    use actix_web::test;
    use serde_json::{Value, json};

    const ADMIN_GUID: &str = "c0a1e7f2-3b44-4d6e-9f10-7a2b3c4d5e6f";

    async fn admin_state() -> TestState {
        let mut state = TestState::new().await;
        state.config.admin_guid_hash = Some(hash_host_guid("test-secret", ADMIN_GUID).unwrap());
        state
    }

    #[actix_web::test]
    async fn test_admin_login() {
        let state = admin_state().await;
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/admin/authenticate")
            .set_json(json!({ "adminGuid": ADMIN_GUID }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert!(body["sessionToken"].as_str().unwrap().len() > 40);

        let req = test::TestRequest::post()
            .uri("/api/admin/authenticate")
            .set_json(json!({ "adminGuid": "admin-noor-canvas-2025" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);

        let req = test::TestRequest::post()
            .uri("/api/admin/authenticate")
            .set_json(json!({}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn test_admin_login_needs_configured_hash() {
        let state = TestState::new().await;
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/admin/authenticate")
            .set_json(json!({ "adminGuid": ADMIN_GUID }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);
    }

    #[actix_web::test]
    async fn test_admin_routes_need_session_token() {
        let state = admin_state().await;
        state.session(1).await;
        let app = test_app!(state);

        let req = test::TestRequest::get()
            .uri("/api/admin/sessions?sessionToken=forged")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);

        let req = test::TestRequest::post()
            .uri("/api/admin/session/1/terminate?sessionToken=forged")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);
        assert_eq!(state.store.find_session(1).await.unwrap().unwrap().status, "Created");

        let req = test::TestRequest::get().uri("/api/admin/users").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn test_list_and_terminate_sessions() {
        let state = admin_state().await;
        for id in [1, 2, 3] {
            state.session(id).await;
        }
        let token = state
            .store
            .create_admin_session(chrono::Duration::hours(1))
            .await
            .unwrap()
            .session_token;
        let (listener, mut rx) = state.hub.connect().await;
        state.hub.add_to_group(listener, &session_group(2)).await;
        let app = test_app!(state);

        let req = test::TestRequest::get()
            .uri(&format!("/api/admin/sessions?sessionToken={}&pageSize=2", token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["totalCount"], 3);
        assert_eq!(body["totalPages"], 2);
        assert_eq!(body["sessions"].as_array().unwrap().len(), 2);

        let req = test::TestRequest::get()
            .uri(&format!("/api/admin/sessions?sessionToken={}&pageSize=500", token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let req = test::TestRequest::post()
            .uri(&format!("/api/admin/session/2/terminate?sessionToken={}", token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "Completed");
        let frames = drain(&mut rx);
        assert_eq!(events(&frames), vec!["SessionEnded"]);
        assert_eq!(frames[0]["data"]["reason"], "Terminated by administrator");

        let req = test::TestRequest::post()
            .uri(&format!("/api/admin/session/99/terminate?sessionToken={}", token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
    }

    #[actix_web::test]
    async fn test_list_and_deactivate_users() {
        let state = admin_state().await;
        let session = state.session(5).await;
        let (participant, _) = state
            .store
            .register_participant(
                5,
                &session.user_token,
                NewParticipant {
                    name: "Amina".into(),
                    email: Some("amina@example.org".into()),
                    country: Some("PK".into()),
                    city: None,
                },
            )
            .await
            .unwrap();
        let token = state
            .store
            .create_admin_session(chrono::Duration::hours(1))
            .await
            .unwrap()
            .session_token;
        let app = test_app!(state);

        let req = test::TestRequest::get()
            .uri(&format!("/api/admin/users?sessionToken={}", token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["totalCount"], 1);
        assert_eq!(body["users"][0]["userGuid"], participant.user_guid.as_str());
        assert_eq!(body["users"][0]["isActive"], true);
        assert!(body["users"][0].get("email").is_none());

        let req = test::TestRequest::post()
            .uri(&format!(
                "/api/admin/user/{}/deactivate?sessionToken={}",
                participant.user_guid, token
            ))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
        assert!(
            state
                .store
                .find_participant(5, &participant.user_guid)
                .await
                .unwrap()
                .is_none()
        );

        let req = test::TestRequest::post()
            .uri("/api/participant/register-with-token")
            .set_json(json!({
                "token": session.user_token,
                "name": "Amina",
                "email": "amina@example.org",
                "country": "PK"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::post()
            .uri(&format!("/api/admin/user/nobody/deactivate?sessionToken={}", token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
    }
}
