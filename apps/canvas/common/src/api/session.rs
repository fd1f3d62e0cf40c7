use super::SessionSummary;
use super::participant::ParticipantView;
use crate::error::ApiError;
use crate::hub::annotation::annotation_payload;
use crate::store::CanvasStore;
use crate::utils::generate_request_id;
use crate::SessionDataType;
use actix_web::{HttpResponse, get, web};
use serde_json::{Value, json};

/// Snapshot a client loads when it (re)connects to a running session.
#[get("/{session_id}/state")]
pub async fn session_state(
    store: web::Data<CanvasStore>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    let session = store
        .find_session(session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", session_id)))?;
    if session.ended_at.is_some() {
        return Err(ApiError::BadRequest(format!("Session {} has ended", session_id)));
    }
    if session.started_at.is_none() {
        return Err(ApiError::BadRequest(format!("Session {} has not started", session_id)));
    }

    let participants: Vec<ParticipantView> = store
        .participants_for_session(session_id)
        .await?
        .iter()
        .map(ParticipantView::from)
        .collect();
    let annotations: Vec<Value> = store
        .data_of_type(session_id, SessionDataType::Annotation)
        .await?
        .iter()
        .map(annotation_payload)
        .collect();
    let shared_assets: Vec<Value> = store
        .data_of_type(session_id, SessionDataType::SharedAsset)
        .await?
        .into_iter()
        .map(|row| row.content)
        .collect();
    let summary = SessionSummary::load(&store, &session).await?;

    Ok(HttpResponse::Ok().json(json!({
        "session": summary,
        "participants": participants,
        "annotations": annotations,
        "sharedAssets": shared_assets,
        "requestId": generate_request_id(),
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(session_state);
}

#[cfg(test)]
mod tests {
    use crate::SessionDataType;
    use crate::api::testing::{TestState, test_app};
    use actix_web::test;
    use serde_json::{Value, json};

    #[actix_web::test]
    async fn test_state_requires_running_session() {
        let state = TestState::new().await;
        state.session(20).await;
        let app = test_app!(state);

        let req = test::TestRequest::get().uri("/api/session/20/state").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let req = test::TestRequest::get().uri("/api/session/21/state").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);

        state.store.start_session(20).await.unwrap();
        state.store.end_session(20).await.unwrap();
        let req = test::TestRequest::get().uri("/api/session/20/state").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn test_state_snapshot() {
        let state = TestState::new().await;
        state.session(22).await;
        state.store.start_session(22).await.unwrap();
        state
            .store
            .insert_data(22, SessionDataType::Annotation, json!({ "tool": "pen" }), Some("host"))
            .await
            .unwrap();
        state
            .store
            .insert_data(22, SessionDataType::SharedAsset, json!({ "selector": "#a" }), Some("host"))
            .await
            .unwrap();
        let app = test_app!(state);

        let req = test::TestRequest::get().uri("/api/session/22/state").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["session"]["status"], "Active");
        assert_eq!(body["annotations"][0]["annotationData"]["tool"], "pen");
        assert_eq!(body["sharedAssets"][0]["selector"], "#a");
        assert!(body["participants"].as_array().unwrap().is_empty());
    }
}
