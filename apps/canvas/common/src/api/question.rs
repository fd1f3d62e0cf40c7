use super::ensure_well_formed;
use crate::error::ApiError;
use crate::hub::qa::MAX_QUESTION_CHARS;
use crate::hub::{Hub, HubEvent, host_group, session_group};
use crate::store::{CanvasStore, OwnedChange, VoteDirection, VoteOutcome};
use crate::token::TokenKind;
use crate::utils::generate_request_id;
use crate::SessionStatus;
use actix_web::{HttpResponse, get, post, web};
use entity::session;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuestionRequest {
    pub session_token: String,
    #[validate(length(min = 1, max = 280))]
    pub question_text: String,
    #[validate(length(min = 1))]
    pub user_guid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub session_token: String,
    pub direction: String,
    pub user_guid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuestionRequest {
    pub session_token: String,
    pub user_guid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub host_token: String,
    #[serde(default)]
    pub answer_text: Option<String>,
}

async fn session_for_token(
    store: &CanvasStore,
    token: &str,
    kind: TokenKind,
) -> Result<session::Model, ApiError> {
    ensure_well_formed(token)?;
    store
        .validate_token(token, kind)
        .await?
        .ok_or_else(|| ApiError::NotFound("Invalid or expired session token".into()))
}

fn ensure_accepts_activity(session: &session::Model) -> Result<(), ApiError> {
    let accepts = SessionStatus::parse(&session.status).is_some_and(|s| s.accepts_activity());
    if !accepts {
        return Err(ApiError::BadRequest(format!(
            "Session is {} and not accepting activity",
            session.status
        )));
    }
    Ok(())
}

#[post("/submit")]
pub async fn submit_question(
    store: web::Data<CanvasStore>,
    hub: web::Data<Hub>,
    req: web::Json<SubmitQuestionRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = req.into_inner();
    req.validate()?;
    let text = req.question_text.trim();
    if text.is_empty() || text.chars().count() > MAX_QUESTION_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Question must be between 1 and {} characters",
            MAX_QUESTION_CHARS
        )));
    }

    let session = session_for_token(&store, &req.session_token, TokenKind::User).await?;
    ensure_accepts_activity(&session)?;
    let participant = store
        .find_participant(session.session_id, &req.user_guid)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Participant is not registered for this session".into()))?;
    let user_name = participant.name.unwrap_or_else(|| "Anonymous".to_string());

    let record = store
        .submit_question(session.session_id, &req.user_guid, &user_name, text)
        .await?;
    let request_id = generate_request_id();
    info!(
        "[{}] Question {} submitted to session {}",
        request_id, record.question_id, session.session_id
    );

    hub.notify_group(
        &session_group(session.session_id),
        HubEvent::new(
            "QuestionReceived",
            json!({ "sessionId": session.session_id, "question": record }),
        ),
    )
    .await;
    hub.notify_group(
        &host_group(session.session_id),
        HubEvent::new(
            "HostQuestionAlert",
            json!({
                "sessionId": session.session_id,
                "questionId": record.question_id,
                "text": record.text,
                "userName": record.user_name,
            }),
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "questionId": record.question_id,
        "question": record,
        "requestId": request_id,
    })))
}

#[post("/{question_id}/vote")]
pub async fn vote(
    store: web::Data<CanvasStore>,
    hub: web::Data<Hub>,
    path: web::Path<Uuid>,
    req: web::Json<VoteRequest>,
) -> Result<HttpResponse, ApiError> {
    let question_id = path.into_inner();
    let direction = VoteDirection::parse(&req.direction)
        .ok_or_else(|| ApiError::BadRequest("Direction must be 'up' or 'down'".into()))?;
    let session = session_for_token(&store, &req.session_token, TokenKind::User).await?;
    ensure_accepts_activity(&session)?;

    let record = match store
        .record_vote(session.session_id, question_id, &req.user_guid, direction)
        .await?
    {
        VoteOutcome::Counted(record) => record,
        VoteOutcome::AlreadyVoted => {
            return Err(ApiError::Conflict("You have already voted on this question".into()));
        }
        VoteOutcome::QuestionNotFound => {
            return Err(ApiError::NotFound(format!("Question {} not found", question_id)));
        }
    };

    let data = json!({
        "sessionId": session.session_id,
        "questionId": question_id,
        "votes": record.votes,
    });
    hub.notify_group(
        &session_group(session.session_id),
        HubEvent::new("QuestionVoteUpdate", data.clone()),
    )
    .await;
    hub.notify_group(
        &host_group(session.session_id),
        HubEvent::new("VoteUpdateReceived", data),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "questionId": question_id,
        "votes": record.votes,
        "requestId": generate_request_id(),
    })))
}

#[get("/session/{token}")]
pub async fn session_questions(
    store: web::Data<CanvasStore>,
    token: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let token = token.into_inner();
    ensure_well_formed(&token)?;
    let (session, kind) = store
        .find_by_any_token(&token)
        .await?
        .ok_or_else(|| ApiError::NotFound("Invalid or expired session token".into()))?;
    let questions = store.questions_for_session(session.session_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "sessionId": session.session_id,
        "tokenType": kind.as_str(),
        "questionCount": questions.len(),
        "questions": questions,
        "requestId": generate_request_id(),
    })))
}

#[post("/{question_id}/delete")]
pub async fn delete_question(
    store: web::Data<CanvasStore>,
    hub: web::Data<Hub>,
    path: web::Path<Uuid>,
    req: web::Json<DeleteQuestionRequest>,
) -> Result<HttpResponse, ApiError> {
    let question_id = path.into_inner();
    let session = session_for_token(&store, &req.session_token, TokenKind::User).await?;

    // a foreign question looks the same as a missing one
    match store
        .delete_question(session.session_id, question_id, &req.user_guid)
        .await?
    {
        OwnedChange::Applied(_) => {}
        OwnedChange::NotFound | OwnedChange::NotOwner => {
            return Err(ApiError::NotFound(format!("Question {} not found", question_id)));
        }
    }

    hub.notify_group(
        &session_group(session.session_id),
        HubEvent::new(
            "QuestionDeleted",
            json!({ "sessionId": session.session_id, "questionId": question_id }),
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "questionId": question_id,
        "requestId": generate_request_id(),
    })))
}

#[post("/{question_id}/answer")]
pub async fn answer_question(
    store: web::Data<CanvasStore>,
    hub: web::Data<Hub>,
    path: web::Path<Uuid>,
    req: web::Json<AnswerRequest>,
) -> Result<HttpResponse, ApiError> {
    let question_id = path.into_inner();
    let req = req.into_inner();
    let session = session_for_token(&store, &req.host_token, TokenKind::Host).await?;
    let answer_text = req.answer_text.filter(|t| !t.trim().is_empty());

    let record = store
        .answer_question(session.session_id, question_id, "host", answer_text)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Question {} not found", question_id)))?;

    hub.notify_group(
        &session_group(session.session_id),
        HubEvent::new(
            "QuestionAnswered",
            json!({
                "sessionId": session.session_id,
                "questionId": question_id,
                "answerText": record.answer_text,
            }),
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "question": record,
        "requestId": generate_request_id(),
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(submit_question)
        .service(session_questions)
        .service(vote)
        .service(delete_question)
        .service(answer_question);
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{TestState, test_app};
    use crate::hub::testing::{drain, events};
    use crate::hub::{host_group, session_group};
    use crate::store::NewParticipant;
    use actix_web::test;
    use entity::session;
    use serde_json::{Value, json};

    async fn live_session(state: &TestState, session_id: i64) -> (session::Model, String) {
        let session = state.session(session_id).await;
        state.store.start_session(session_id).await.unwrap();
        let (participant, _) = state
            .store
            .register_participant(
                session_id,
                &session.user_token,
                NewParticipant {
                    name: "Yusuf".into(),
                    email: Some("yusuf@example.org".into()),
                    country: Some("GB".into()),
                    city: None,
                },
            )
            .await
            .unwrap();
        (session, participant.user_guid)
    }

    #[actix_web::test]
    async fn test_submit_notifies_session_and_host() {
        let state = TestState::new().await;
        let (session, user_guid) = live_session(&state, 1).await;
        let (audience, mut audience_rx) = state.hub.connect().await;
        let (host, mut host_rx) = state.hub.connect().await;
        state.hub.add_to_group(audience, &session_group(1)).await;
        state.hub.add_to_group(host, &host_group(1)).await;
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/question/submit")
            .set_json(json!({
                "sessionToken": session.user_token,
                "questionText": "  What does sabr mean here?  ",
                "userGuid": user_guid
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["question"]["text"], "What does sabr mean here?");
        assert_eq!(body["question"]["userName"], "Yusuf");

        assert_eq!(events(&drain(&mut audience_rx)), vec!["QuestionReceived"]);
        assert_eq!(events(&drain(&mut host_rx)), vec!["HostQuestionAlert"]);
    }

    #[actix_web::test]
    async fn test_submit_rules() {
        let state = TestState::new().await;
        let (session, user_guid) = live_session(&state, 2).await;
        let idle = state.session(3).await;
        let app = test_app!(state);

        // unregistered participant
        let req = test::TestRequest::post()
            .uri("/api/question/submit")
            .set_json(json!({
                "sessionToken": session.user_token,
                "questionText": "Hello?",
                "userGuid": "stranger"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);

        // too long
        let req = test::TestRequest::post()
            .uri("/api/question/submit")
            .set_json(json!({
                "sessionToken": session.user_token,
                "questionText": "q".repeat(281),
                "userGuid": user_guid
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        // session not yet configured or started
        let req = test::TestRequest::post()
            .uri("/api/question/submit")
            .set_json(json!({
                "sessionToken": idle.user_token,
                "questionText": "Hello?",
                "userGuid": user_guid
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn test_vote_once_per_user() {
        let state = TestState::new().await;
        let (session, user_guid) = live_session(&state, 4).await;
        let record = state
            .store
            .submit_question(4, &user_guid, "Yusuf", "Q1")
            .await
            .unwrap();
        let app = test_app!(state);

        let vote = json!({ "sessionToken": session.user_token, "direction": "UP", "userGuid": "voter-1" });
        let req = test::TestRequest::post()
            .uri(&format!("/api/question/{}/vote", record.question_id))
            .set_json(&vote)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["votes"], 1);

        let req = test::TestRequest::post()
            .uri(&format!("/api/question/{}/vote", record.question_id))
            .set_json(&vote)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 409);

        let req = test::TestRequest::post()
            .uri(&format!("/api/question/{}/vote", record.question_id))
            .set_json(json!({ "sessionToken": session.user_token, "direction": "sideways", "userGuid": "voter-2" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let req = test::TestRequest::post()
            .uri("/api/question/not-a-uuid/vote")
            .set_json(&vote)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        // no votes once the session has ended
        state.store.end_session(4).await.unwrap();
        let req = test::TestRequest::post()
            .uri(&format!("/api/question/{}/vote", record.question_id))
            .set_json(json!({ "sessionToken": session.user_token, "direction": "up", "userGuid": "voter-3" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
        let stored = state.store.find_question(4, record.question_id).await.unwrap().unwrap();
        assert_eq!(stored.votes, 1);
    }

    #[actix_web::test]
    async fn test_list_accepts_both_tokens() {
        let state = TestState::new().await;
        let (session, user_guid) = live_session(&state, 5).await;
        state.store.submit_question(5, &user_guid, "Yusuf", "First").await.unwrap();
        state.store.submit_question(5, &user_guid, "Yusuf", "Second").await.unwrap();
        let app = test_app!(state);

        for (token, kind) in [(&session.user_token, "user"), (&session.host_token, "host")] {
            let req = test::TestRequest::get()
                .uri(&format!("/api/question/session/{}", token))
                .to_request();
            let body: Value = test::call_and_read_body_json(&app, req).await;
            assert_eq!(body["tokenType"], kind);
            assert_eq!(body["questionCount"], 2);
            assert_eq!(body["questions"][0]["text"], "First");
        }
    }

    #[actix_web::test]
    async fn test_only_author_deletes() {
        let state = TestState::new().await;
        let (session, user_guid) = live_session(&state, 6).await;
        let record = state
            .store
            .submit_question(6, &user_guid, "Yusuf", "Mine")
            .await
            .unwrap();
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri(&format!("/api/question/{}/delete", record.question_id))
            .set_json(json!({ "sessionToken": session.user_token, "userGuid": "someone-else" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);

        let req = test::TestRequest::post()
            .uri(&format!("/api/question/{}/delete", record.question_id))
            .set_json(json!({ "sessionToken": session.user_token, "userGuid": user_guid }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
        assert!(state.store.questions_for_session(6).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_host_answers_question() {
        let state = TestState::new().await;
        let (session, user_guid) = live_session(&state, 7).await;
        let record = state
            .store
            .submit_question(7, &user_guid, "Yusuf", "Why?")
            .await
            .unwrap();
        let (audience, mut rx) = state.hub.connect().await;
        state.hub.add_to_group(audience, &session_group(7)).await;
        let app = test_app!(state);

        // participants cannot answer
        let req = test::TestRequest::post()
            .uri(&format!("/api/question/{}/answer", record.question_id))
            .set_json(json!({ "hostToken": session.user_token, "answerText": "No" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);

        let req = test::TestRequest::post()
            .uri(&format!("/api/question/{}/answer", record.question_id))
            .set_json(json!({ "hostToken": session.host_token, "answerText": "Because." }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["question"]["isAnswered"], true);
        assert_eq!(body["question"]["answerText"], "Because.");

        let frames = drain(&mut rx);
        assert_eq!(events(&frames), vec!["QuestionAnswered"]);
    }
}
