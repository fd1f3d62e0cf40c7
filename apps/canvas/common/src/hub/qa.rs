//! `/hub/qa`: live question queue and voting.

use super::{HubContext, HubEvent, parse_request, qa_group};
use crate::{ServiceError, SessionStatus};
use crate::store::{VoteDirection, VoteOutcome};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

pub const MAX_QUESTION_CHARS: usize = 280;

#[derive(Debug, Deserialize)]
#[serde(tag = "method", rename_all_fields = "camelCase")]
pub enum QaHubRequest {
    JoinQaSession {
        session_id: i64,
    },
    LeaveQaSession {
        session_id: i64,
    },
    AskQuestion {
        session_id: i64,
        question_text: String,
        user_id: String,
    },
    Vote {
        session_id: i64,
        question_id: Uuid,
        user_id: String,
        vote_value: i32,
    },
}

fn vote_direction(vote_value: i32) -> Option<VoteDirection> {
    match vote_value {
        1 => Some(VoteDirection::Up),
        0 => Some(VoteDirection::Down),
        _ => None,
    }
}

/// Why `session_id` cannot take questions or votes right now, if it cannot.
async fn inactive_reason(ctx: &HubContext, session_id: i64) -> Result<Option<String>, ServiceError> {
    let Some(session) = ctx.store.find_session(session_id).await? else {
        return Ok(Some("Session not found".to_string()));
    };
    let accepts = SessionStatus::parse(&session.status).is_some_and(|s| s.accepts_activity());
    Ok((!accepts).then(|| format!("Session is {} and not accepting activity", session.status)))
}

pub async fn dispatch(ctx: &HubContext, frame: &str) -> Result<(), ServiceError> {
    let Some(request) = parse_request::<QaHubRequest>(ctx, frame).await? else {
        return Ok(());
    };

    match request {
        QaHubRequest::JoinQaSession { session_id } => {
            ctx.join(&qa_group(session_id)).await;
        }
        QaHubRequest::LeaveQaSession { session_id } => {
            ctx.leave(&qa_group(session_id)).await;
        }
        QaHubRequest::AskQuestion {
            session_id,
            question_text,
            user_id,
        } => ask_question(ctx, session_id, &question_text, &user_id).await?,
        QaHubRequest::Vote {
            session_id,
            question_id,
            user_id,
            vote_value,
        } => vote(ctx, session_id, question_id, &user_id, vote_value).await?,
    }
    Ok(())
}

async fn ask_question(
    ctx: &HubContext,
    session_id: i64,
    question_text: &str,
    user_id: &str,
) -> Result<(), ServiceError> {
    let text = question_text.trim();
    let length = text.chars().count();
    if length == 0 || length > MAX_QUESTION_CHARS {
        return ctx
            .reply(HubEvent::new(
                "QuestionError",
                json!({
                    "message": format!("Question must be between 1 and {} characters", MAX_QUESTION_CHARS)
                }),
            ))
            .await;
    }
    if let Some(message) = inactive_reason(ctx, session_id).await? {
        return ctx
            .reply(HubEvent::new("QuestionError", json!({ "message": message })))
            .await;
    }

    let user_name = ctx
        .store
        .find_participant(session_id, user_id)
        .await?
        .and_then(|p| p.name)
        .unwrap_or_else(|| "Anonymous".to_string());
    let record = ctx
        .store
        .submit_question(session_id, user_id, &user_name, text)
        .await?;

    ctx.broadcast(
        &qa_group(session_id),
        HubEvent::new(
            "QuestionQueued",
            json!({ "sessionId": session_id, "question": record }),
        ),
    )
    .await?;
    ctx.reply(HubEvent::new(
        "QuestionSubmitted",
        json!({ "questionId": record.question_id, "sessionId": session_id }),
    ))
    .await
}

async fn vote(
    ctx: &HubContext,
    session_id: i64,
    question_id: Uuid,
    user_id: &str,
    vote_value: i32,
) -> Result<(), ServiceError> {
    let Some(direction) = vote_direction(vote_value) else {
        return ctx
            .reply(HubEvent::new(
                "VoteError",
                json!({ "message": "Vote value must be 0 or 1" }),
            ))
            .await;
    };
    if let Some(message) = inactive_reason(ctx, session_id).await? {
        return ctx
            .reply(HubEvent::new("VoteError", json!({ "message": message })))
            .await;
    }

    match ctx
        .store
        .record_vote(session_id, question_id, user_id, direction)
        .await?
    {
        VoteOutcome::Counted(record) => {
            ctx.broadcast(
                &qa_group(session_id),
                HubEvent::new(
                    "QuestionVoteUpdated",
                    json!({ "questionId": question_id, "votes": record.votes }),
                ),
            )
            .await?;
            ctx.reply(HubEvent::new(
                "VoteSubmitted",
                json!({ "questionId": question_id, "voteValue": vote_value }),
            ))
            .await
        }
        VoteOutcome::AlreadyVoted => {
            ctx.reply(HubEvent::new(
                "VoteError",
                json!({ "message": "You have already voted on this question" }),
            ))
            .await
        }
        VoteOutcome::QuestionNotFound => {
            ctx.reply(HubEvent::new(
                "VoteError",
                json!({ "message": "Question not found" }),
            ))
            .await
        }
    }
}
