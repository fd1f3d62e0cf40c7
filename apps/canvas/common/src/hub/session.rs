//! `/hub/session`: presence, asset sharing and host/participant notifications.

use super::{HubContext, HubEvent, host_group, parse_request, session_group, usertoken_group};
use crate::ServiceError;
use chrono::Utc;
use entity::participant;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

fn default_role() -> String {
    "user".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "method", rename_all_fields = "camelCase")]
pub enum SessionHubRequest {
    JoinSession {
        session_id: i64,
        #[serde(default = "default_role")]
        role: String,
    },
    LeaveSession {
        session_id: i64,
    },
    JoinSessionGroup {
        session_id: i64,
    },
    ShareAsset {
        session_id: i64,
        asset: Value,
    },
    Ping,
    JoinHostGroup {
        session_id: i64,
    },
    LeaveHostGroup {
        session_id: i64,
    },
    BroadcastQuestion {
        session_id: i64,
        question: Value,
    },
    BroadcastVoteUpdate {
        session_id: i64,
        question_id: String,
        votes: i64,
    },
    MarkQuestionAnswered {
        session_id: i64,
        question_id: String,
    },
    JoinGroup {
        group_name: String,
    },
    LeaveGroup {
        group_name: String,
    },
    BroadcastSessionBegan {
        session_id: i64,
        #[serde(default)]
        data: Value,
    },
    BroadcastSessionEnded {
        session_id: i64,
        #[serde(default)]
        reason: Option<String>,
    },
    BroadcastParticipantJoined {
        session_id: i64,
        participant: Value,
    },
    BroadcastParticipantLeft {
        session_id: i64,
        participant: Value,
    },
}

/// Public view of a participant as sent in `ParticipantJoined` events.
pub fn participant_payload(participant: &participant::Model) -> Value {
    json!({
        "userGuid": participant.user_guid,
        "name": participant.name,
        "country": participant.country,
        "city": participant.city,
        "joinedAt": participant.joined_at,
    })
}

pub async fn dispatch(ctx: &HubContext, frame: &str) -> Result<(), ServiceError> {
    let Some(request) = parse_request::<SessionHubRequest>(ctx, frame).await? else {
        return Ok(());
    };

    match request {
        SessionHubRequest::JoinSession { session_id, role } => {
            let group = session_group(session_id);
            ctx.join(&group).await;
            info!("Connection {} joined {} as {}", ctx.connection, group, role);
            ctx.broadcast(
                &group,
                HubEvent::new(
                    "UserJoined",
                    json!({
                        "connectionId": ctx.connection,
                        "role": role,
                        "timestamp": Utc::now(),
                    }),
                ),
            )
            .await?;
        }
        SessionHubRequest::LeaveSession { session_id } => {
            let group = session_group(session_id);
            ctx.leave(&group).await;
            ctx.broadcast(
                &group,
                HubEvent::new(
                    "UserLeft",
                    json!({ "connectionId": ctx.connection, "timestamp": Utc::now() }),
                ),
            )
            .await?;
        }
        SessionHubRequest::JoinSessionGroup { session_id } => {
            ctx.join(&session_group(session_id)).await;
        }
        SessionHubRequest::ShareAsset { session_id, asset } => {
            ctx.broadcast(
                &session_group(session_id),
                HubEvent::new(
                    "AssetShared",
                    json!({
                        "sessionId": session_id,
                        "asset": asset,
                        "timestamp": Utc::now(),
                        "sharedBy": ctx.connection,
                    }),
                ),
            )
            .await?;
        }
        SessionHubRequest::Ping => {
            ctx.reply(HubEvent::new("Pong", json!({ "timestamp": Utc::now() })))
                .await?;
        }
        SessionHubRequest::JoinHostGroup { session_id } => {
            ctx.join(&host_group(session_id)).await;
        }
        SessionHubRequest::LeaveHostGroup { session_id } => {
            ctx.leave(&host_group(session_id)).await;
        }
        SessionHubRequest::BroadcastQuestion {
            session_id,
            question,
        } => {
            ctx.broadcast(
                &session_group(session_id),
                HubEvent::new("QuestionReceived", question.clone()),
            )
            .await?;
            ctx.broadcast(
                &host_group(session_id),
                HubEvent::new("HostQuestionAlert", question),
            )
            .await?;
        }
        SessionHubRequest::BroadcastVoteUpdate {
            session_id,
            question_id,
            votes,
        } => {
            ctx.broadcast(
                &session_group(session_id),
                HubEvent::new(
                    "QuestionVoteUpdate",
                    json!({ "questionId": question_id, "votes": votes }),
                ),
            )
            .await?;
        }
        SessionHubRequest::MarkQuestionAnswered {
            session_id,
            question_id,
        } => {
            ctx.broadcast(
                &session_group(session_id),
                HubEvent::new(
                    "QuestionAnswered",
                    json!({ "questionId": question_id, "sessionId": session_id }),
                ),
            )
            .await?;
        }
        SessionHubRequest::JoinGroup { group_name } => {
            ctx.join(&group_name).await;
            if let Some(user_token) = group_name.strip_prefix("usertoken_") {
                replay_participants(ctx, user_token).await?;
            }
        }
        SessionHubRequest::LeaveGroup { group_name } => {
            ctx.leave(&group_name).await;
        }
        SessionHubRequest::BroadcastSessionBegan { session_id, data } => {
            ctx.broadcast(
                &session_group(session_id),
                HubEvent::new(
                    "SessionBegan",
                    json!({ "sessionId": session_id, "data": data, "timestamp": Utc::now() }),
                ),
            )
            .await?;
        }
        SessionHubRequest::BroadcastSessionEnded { session_id, reason } => {
            ctx.broadcast(
                &session_group(session_id),
                HubEvent::new(
                    "SessionEnded",
                    json!({
                        "sessionId": session_id,
                        "reason": reason.unwrap_or_else(|| "Session ended".to_string()),
                        "timestamp": Utc::now(),
                    }),
                ),
            )
            .await?;
        }
        SessionHubRequest::BroadcastParticipantJoined {
            session_id,
            participant,
        } => {
            ctx.broadcast(
                &session_group(session_id),
                HubEvent::new("ParticipantJoined", participant),
            )
            .await?;
        }
        SessionHubRequest::BroadcastParticipantLeft {
            session_id,
            participant,
        } => {
            ctx.broadcast(
                &session_group(session_id),
                HubEvent::new("ParticipantLeft", participant),
            )
            .await?;
        }
    }
    Ok(())
}

/// Late joiners of a waiting room get one `ParticipantJoined` per participant already registered.
async fn replay_participants(ctx: &HubContext, user_token: &str) -> Result<(), ServiceError> {
    let participants = ctx.store.participants_for_user_token(user_token).await?;
    for participant in &participants {
        ctx.reply(HubEvent::new(
            "ParticipantJoined",
            json!({
                "sessionId": participant.session_id,
                "participant": participant_payload(participant),
            }),
        ))
        .await?;
    }
    Ok(())
}
