use crate::error::ApiError;
use crate::hub::annotation::annotation_payload;
use crate::hub::{Hub, HubEvent, annotation_group};
use crate::store::{CanvasStore, OwnedChange};
use crate::SessionDataType;
use actix_web::{HttpResponse, delete, get, post, put, web};
use entity::session_data;
use serde::Deserialize;
use serde_json::{Value, json};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnnotationRequest {
    #[validate(range(min = 1))]
    pub session_id: i64,
    #[validate(length(min = 1, max = 128))]
    pub created_by: String,
    pub annotation_data: Value,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAnnotationRequest {
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    pub annotation_data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: String,
}

fn positive_session_id(session_id: i64) -> Result<i64, ApiError> {
    if session_id <= 0 {
        return Err(ApiError::BadRequest("Session id must be positive".into()));
    }
    Ok(session_id)
}

fn applied(change: OwnedChange, annotation_id: i32) -> Result<session_data::Model, ApiError> {
    match change {
        OwnedChange::Applied(row) => Ok(row),
        OwnedChange::NotFound => Err(ApiError::NotFound(format!(
            "Annotation {} not found",
            annotation_id
        ))),
        OwnedChange::NotOwner => Err(ApiError::Forbidden(format!(
            "Annotation {} belongs to another user",
            annotation_id
        ))),
    }
}

#[get("/session/{session_id}")]
pub async fn session_annotations(
    store: web::Data<CanvasStore>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let session_id = positive_session_id(path.into_inner())?;
    let annotations: Vec<Value> = store
        .data_of_type(session_id, SessionDataType::Annotation)
        .await?
        .iter()
        .map(annotation_payload)
        .collect();
    Ok(HttpResponse::Ok().json(annotations))
}

#[post("")]
pub async fn create_annotation(
    store: web::Data<CanvasStore>,
    hub: web::Data<Hub>,
    req: web::Json<CreateAnnotationRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = req.into_inner();
    req.validate()?;
    if store.find_session(req.session_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Session {} not found", req.session_id)));
    }

    let row = store
        .insert_data(
            req.session_id,
            SessionDataType::Annotation,
            req.annotation_data,
            Some(&req.created_by),
        )
        .await?;
    let payload = annotation_payload(&row);
    hub.notify_group(
        &annotation_group(req.session_id),
        HubEvent::new("AnnotationCreated", payload.clone()),
    )
    .await;

    Ok(HttpResponse::Created().json(payload))
}

#[get("/{annotation_id}")]
pub async fn get_annotation(
    store: web::Data<CanvasStore>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let annotation_id = path.into_inner();
    let row = store
        .find_data(annotation_id, SessionDataType::Annotation)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Annotation {} not found", annotation_id)))?;
    Ok(HttpResponse::Ok().json(annotation_payload(&row)))
}

#[put("/{annotation_id}")]
pub async fn update_annotation(
    store: web::Data<CanvasStore>,
    hub: web::Data<Hub>,
    path: web::Path<i32>,
    req: web::Json<UpdateAnnotationRequest>,
) -> Result<HttpResponse, ApiError> {
    let annotation_id = path.into_inner();
    let req = req.into_inner();
    req.validate()?;

    let change = store
        .update_owned_data(
            annotation_id,
            SessionDataType::Annotation,
            &req.user_id,
            req.annotation_data,
        )
        .await?;
    let row = applied(change, annotation_id)?;
    let payload = annotation_payload(&row);
    hub.notify_group(
        &annotation_group(row.session_id),
        HubEvent::new("AnnotationUpdated", payload.clone()),
    )
    .await;

    Ok(HttpResponse::Ok().json(payload))
}

#[delete("/{annotation_id}")]
pub async fn delete_annotation(
    store: web::Data<CanvasStore>,
    hub: web::Data<Hub>,
    path: web::Path<i32>,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse, ApiError> {
    let annotation_id = path.into_inner();
    let change = store
        .remove_owned_data(annotation_id, SessionDataType::Annotation, &query.user_id)
        .await?;
    let row = applied(change, annotation_id)?;
    hub.notify_group(
        &annotation_group(row.session_id),
        HubEvent::new(
            "AnnotationDeleted",
            json!({ "annotationId": annotation_id, "sessionId": row.session_id }),
        ),
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}

#[delete("/session/{session_id}/clear")]
pub async fn clear_annotations(
    store: web::Data<CanvasStore>,
    hub: web::Data<Hub>,
    path: web::Path<i64>,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse, ApiError> {
    let session_id = positive_session_id(path.into_inner())?;
    let cleared = store
        .remove_data_by_creator(session_id, SessionDataType::Annotation, &query.user_id)
        .await?;
    hub.notify_group(
        &annotation_group(session_id),
        HubEvent::new(
            "AnnotationsCleared",
            json!({ "sessionId": session_id, "clearedBy": query.user_id, "count": cleared }),
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "sessionId": session_id, "cleared": cleared })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(session_annotations)
        .service(clear_annotations)
        .service(create_annotation)
        .service(get_annotation)
        .service(update_annotation)
        .service(delete_annotation);
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{TestState, test_app};
    use crate::hub::annotation_group;
    use crate::hub::testing::{drain, events};
    use actix_web::test;
    use serde_json::{Value, json};

    fn create_request(created_by: &str) -> test::TestRequest {
        test::TestRequest::post().uri("/api/annotations").set_json(json!({
            "sessionId": 9,
            "createdBy": created_by,
            "annotationData": { "tool": "pen", "points": [[0, 0], [4, 4]] }
        }))
    }

    macro_rules! create {
        ($app:expr, $created_by:expr) => {{
            let resp = test::call_service(&$app, create_request($created_by).to_request()).await;
            assert_eq!(resp.status(), 201);
            let body: Value = test::read_body_json(resp).await;
            body
        }};
    }

    #[actix_web::test]
    async fn test_create_and_fetch() {
        let state = TestState::new().await;
        state.session(9).await;
        let (viewer, mut rx) = state.hub.connect().await;
        state.hub.add_to_group(viewer, &annotation_group(9)).await;
        let app = test_app!(state);

        let created = create!(app, "host");
        assert_eq!(events(&drain(&mut rx)), vec!["AnnotationCreated"]);

        let req = test::TestRequest::get()
            .uri(&format!("/api/annotations/{}", created["annotationId"]))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["annotationData"]["tool"], "pen");

        let req = test::TestRequest::get().uri("/api/annotations/session/9").to_request();
        let list: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let req = test::TestRequest::get().uri("/api/annotations/4040").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
    }

    #[actix_web::test]
    async fn test_create_validation() {
        let state = TestState::new().await;
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/annotations")
            .set_json(json!({ "sessionId": 9, "createdBy": "", "annotationData": {} }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let req = test::TestRequest::post()
            .uri("/api/annotations")
            .set_json(json!({ "sessionId": 9, "createdBy": "host", "annotationData": {} }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);

        let req = test::TestRequest::get().uri("/api/annotations/session/0").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn test_update_and_delete_respect_ownership() {
        let state = TestState::new().await;
        state.session(9).await;
        let app = test_app!(state);
        let created = create!(app, "host");
        let id = created["annotationId"].as_i64().unwrap();

        let req = test::TestRequest::put()
            .uri(&format!("/api/annotations/{}", id))
            .set_json(json!({ "userId": "intruder", "annotationData": {} }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::put()
            .uri(&format!("/api/annotations/{}", id))
            .set_json(json!({ "userId": "host", "annotationData": { "tool": "marker" } }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["annotationData"]["tool"], "marker");

        let req = test::TestRequest::delete()
            .uri(&format!("/api/annotations/{}?userId=intruder", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/annotations/{}?userId=host", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 204);

        let req = test::TestRequest::get()
            .uri(&format!("/api/annotations/{}", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
    }

    #[actix_web::test]
    async fn test_clear_only_touches_callers_annotations() {
        let state = TestState::new().await;
        state.session(9).await;
        let app = test_app!(state);
        create!(app, "host");
        create!(app, "host");
        create!(app, "guest");

        let req = test::TestRequest::delete()
            .uri("/api/annotations/session/9/clear?userId=host")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["cleared"], 2);

        let req = test::TestRequest::get().uri("/api/annotations/session/9").to_request();
        let list: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(list[0]["createdBy"], "guest");
    }
}
