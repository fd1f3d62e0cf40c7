//! `/hub/annotation`: persisted drawing annotations relayed between session members.

use super::{HubContext, HubEvent, annotation_group, parse_request};
use crate::store::OwnedChange;
use crate::{ServiceError, SessionDataType};
use chrono::Utc;
use entity::session_data;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(tag = "method", rename_all_fields = "camelCase")]
pub enum AnnotationHubRequest {
    JoinSession {
        session_id: i64,
        #[serde(default)]
        user_id: Option<String>,
    },
    LeaveSession {
        session_id: i64,
    },
    BroadcastAnnotation {
        session_id: i64,
        user_id: String,
        annotation: Value,
    },
    BroadcastAnnotationUpdate {
        session_id: i64,
        annotation_id: i32,
        user_id: String,
        annotation: Value,
    },
    BroadcastAnnotationDeletion {
        session_id: i64,
        annotation_id: i32,
        user_id: String,
    },
    BroadcastClearAnnotations {
        session_id: i64,
        user_id: String,
    },
}

pub fn annotation_payload(row: &session_data::Model) -> Value {
    json!({
        "annotationId": row.data_id,
        "sessionId": row.session_id,
        "createdBy": row.created_by,
        "annotationData": row.content,
        "createdAt": row.created_at,
    })
}

pub async fn dispatch(ctx: &HubContext, frame: &str) -> Result<(), ServiceError> {
    let Some(request) = parse_request::<AnnotationHubRequest>(ctx, frame).await? else {
        return Ok(());
    };

    match request {
        AnnotationHubRequest::JoinSession {
            session_id,
            user_id,
        } => {
            let group = annotation_group(session_id);
            ctx.join(&group).await;

            let annotations: Vec<Value> = ctx
                .store
                .data_of_type(session_id, SessionDataType::Annotation)
                .await?
                .iter()
                .map(annotation_payload)
                .collect();
            ctx.reply(HubEvent::new(
                "LoadAnnotations",
                json!({ "sessionId": session_id, "annotations": annotations }),
            ))
            .await?;
            ctx.broadcast_others(
                &group,
                HubEvent::new(
                    "UserJoined",
                    json!({ "userId": user_id, "connectionId": ctx.connection, "timestamp": Utc::now() }),
                ),
            )
            .await?;
        }
        AnnotationHubRequest::LeaveSession { session_id } => {
            ctx.leave(&annotation_group(session_id)).await;
        }
        AnnotationHubRequest::BroadcastAnnotation {
            session_id,
            user_id,
            annotation,
        } => {
            if ctx.store.find_session(session_id).await?.is_none() {
                return ctx.reply(HubEvent::error("Session not found")).await;
            }
            let row = ctx
                .store
                .insert_data(
                    session_id,
                    SessionDataType::Annotation,
                    annotation,
                    Some(&user_id),
                )
                .await?;
            let payload = annotation_payload(&row);
            ctx.broadcast_others(
                &annotation_group(session_id),
                HubEvent::new("AnnotationCreated", payload.clone()),
            )
            .await?;
            ctx.reply(HubEvent::new("AnnotationConfirmed", payload)).await?;
        }
        // The stored row decides which session hears about a change.
        AnnotationHubRequest::BroadcastAnnotationUpdate {
            session_id: _,
            annotation_id,
            user_id,
            annotation,
        } => {
            let change = ctx
                .store
                .update_owned_data(annotation_id, SessionDataType::Annotation, &user_id, annotation)
                .await?;
            let Some(row) = applied_or_report(ctx, change, annotation_id).await? else {
                return Ok(());
            };
            ctx.broadcast(
                &annotation_group(row.session_id),
                HubEvent::new("AnnotationUpdated", annotation_payload(&row)),
            )
            .await?;
        }
        AnnotationHubRequest::BroadcastAnnotationDeletion {
            session_id: _,
            annotation_id,
            user_id,
        } => {
            let change = ctx
                .store
                .remove_owned_data(annotation_id, SessionDataType::Annotation, &user_id)
                .await?;
            let Some(row) = applied_or_report(ctx, change, annotation_id).await? else {
                return Ok(());
            };
            ctx.broadcast(
                &annotation_group(row.session_id),
                HubEvent::new(
                    "AnnotationDeleted",
                    json!({ "annotationId": annotation_id, "sessionId": row.session_id }),
                ),
            )
            .await?;
        }
        AnnotationHubRequest::BroadcastClearAnnotations {
            session_id,
            user_id,
        } => {
            let cleared = ctx
                .store
                .remove_data_by_creator(session_id, SessionDataType::Annotation, &user_id)
                .await?;
            ctx.broadcast(
                &annotation_group(session_id),
                HubEvent::new(
                    "AnnotationsCleared",
                    json!({ "sessionId": session_id, "clearedBy": user_id, "count": cleared }),
                ),
            )
            .await?;
        }
    }
    Ok(())
}

async fn applied_or_report(
    ctx: &HubContext,
    change: OwnedChange,
    annotation_id: i32,
) -> Result<Option<session_data::Model>, ServiceError> {
    let message = match change {
        OwnedChange::Applied(row) => return Ok(Some(row)),
        OwnedChange::NotFound => format!("Annotation {} not found", annotation_id),
        OwnedChange::NotOwner => {
            warn!(
                "Connection {} tried to change annotation {} it does not own",
                ctx.connection, annotation_id
            );
            format!("Annotation {} belongs to another user", annotation_id)
        }
    };
    ctx.reply(HubEvent::error(message)).await?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Hub;
    use crate::hub::testing::{drain, events};
    use crate::store::{CanvasStore, NewSession};
    use crate::store::testing::memory_store;
    use chrono::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn setup() -> (CanvasStore, Hub, [(HubContext, UnboundedReceiver<String>); 2]) {
        let hub = Hub::new();
        let store = memory_store().await;
        store
            .create_session(NewSession {
                session_id: 2,
                title: None,
                description: None,
                created_by: None,
                host_guid_hash: None,
                expires_at: Utc::now() + Duration::hours(1),
            })
            .await
            .unwrap();

        let mut members = Vec::new();
        for user in ["alice", "bob"] {
            let (connection, rx) = hub.connect().await;
            let ctx = HubContext {
                hub: hub.clone(),
                store: store.clone(),
                connection,
            };
            let frame = json!({"method": "JoinSession", "sessionId": 2, "userId": user});
            dispatch(&ctx, &frame.to_string()).await.unwrap();
            members.push((ctx, rx));
        }
        for (_, rx) in members.iter_mut() {
            drain(rx);
        }
        let members: [(HubContext, UnboundedReceiver<String>); 2] =
            members.try_into().ok().unwrap();
        (store, hub, members)
    }

    #[tokio::test]
    async fn test_join_loads_existing_annotations() {
        let hub = Hub::new();
        let store = memory_store().await;
        store
            .create_session(NewSession {
                session_id: 1,
                title: None,
                description: None,
                created_by: None,
                host_guid_hash: None,
                expires_at: Utc::now() + Duration::hours(1),
            })
            .await
            .unwrap();
        store
            .insert_data(1, SessionDataType::Annotation, json!({"shape": "line"}), Some("alice"))
            .await
            .unwrap();

        let (connection, mut rx) = hub.connect().await;
        let ctx = HubContext { hub, store, connection };
        dispatch(&ctx, r#"{"method":"JoinSession","sessionId":1}"#).await.unwrap();

        let frames = drain(&mut rx);
        assert_eq!(events(&frames), vec!["LoadAnnotations"]);
        assert_eq!(frames[0]["data"]["annotations"][0]["annotationData"]["shape"], "line");
    }

    #[tokio::test]
    async fn test_broadcast_confirms_caller_and_notifies_others() {
        let (store, _hub, [(alice, mut alice_rx), (_bob, mut bob_rx)]) = setup().await;

        dispatch(
            &alice,
            r#"{"method":"BroadcastAnnotation","sessionId":2,"userId":"alice","annotation":{"x":1}}"#,
        )
        .await
        .unwrap();

        assert_eq!(events(&drain(&mut alice_rx)), vec!["AnnotationConfirmed"]);
        let bob_frames = drain(&mut bob_rx);
        assert_eq!(events(&bob_frames), vec!["AnnotationCreated"]);
        assert_eq!(bob_frames[0]["data"]["createdBy"], "alice");
        assert_eq!(store.data_of_type(2, SessionDataType::Annotation).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_only_owner_can_delete() {
        let (store, _hub, [(alice, mut alice_rx), (bob, mut bob_rx)]) = setup().await;
        let row = store
            .insert_data(2, SessionDataType::Annotation, json!({}), Some("alice"))
            .await
            .unwrap();

        let frame = json!({
            "method": "BroadcastAnnotationDeletion",
            "sessionId": 2,
            "annotationId": row.data_id,
            "userId": "bob"
        });
        dispatch(&bob, &frame.to_string()).await.unwrap();
        assert_eq!(events(&drain(&mut bob_rx)), vec!["Error"]);
        assert!(drain(&mut alice_rx).is_empty());

        let frame = json!({
            "method": "BroadcastAnnotationDeletion",
            "sessionId": 2,
            "annotationId": row.data_id,
            "userId": "alice"
        });
        dispatch(&alice, &frame.to_string()).await.unwrap();
        assert_eq!(events(&drain(&mut bob_rx)), vec!["AnnotationDeleted"]);
        assert_eq!(events(&drain(&mut alice_rx)), vec!["AnnotationDeleted"]);
    }

    #[tokio::test]
    async fn test_update_relays_new_content() {
        let (store, _hub, [(alice, _alice_rx), (_bob, mut bob_rx)]) = setup().await;
        let row = store
            .insert_data(2, SessionDataType::Annotation, json!({"v": 1}), Some("alice"))
            .await
            .unwrap();

        let frame = json!({
            "method": "BroadcastAnnotationUpdate",
            "sessionId": 2,
            "annotationId": row.data_id,
            "userId": "alice",
            "annotation": {"v": 2}
        });
        dispatch(&alice, &frame.to_string()).await.unwrap();
        let frames = drain(&mut bob_rx);
        assert_eq!(events(&frames), vec!["AnnotationUpdated"]);
        assert_eq!(frames[0]["data"]["annotationData"]["v"], 2);
    }

    #[tokio::test]
    async fn test_changes_go_to_the_annotations_own_session() {
        let (store, hub, [(alice, mut alice_rx), (_bob, mut bob_rx)]) = setup().await;
        store
            .create_session(NewSession {
                session_id: 3,
                title: None,
                description: None,
                created_by: None,
                host_guid_hash: None,
                expires_at: Utc::now() + Duration::hours(1),
            })
            .await
            .unwrap();
        let (connection, mut carol_rx) = hub.connect().await;
        let carol = HubContext {
            hub: hub.clone(),
            store: store.clone(),
            connection,
        };
        dispatch(&carol, r#"{"method":"JoinSession","sessionId":3,"userId":"carol"}"#)
            .await
            .unwrap();
        drain(&mut carol_rx);

        let row = store
            .insert_data(2, SessionDataType::Annotation, json!({"v": 1}), Some("alice"))
            .await
            .unwrap();
        let frame = json!({
            "method": "BroadcastAnnotationUpdate",
            "sessionId": 3,
            "annotationId": row.data_id,
            "userId": "alice",
            "annotation": {"v": 2}
        });
        dispatch(&alice, &frame.to_string()).await.unwrap();
        assert!(drain(&mut carol_rx).is_empty());
        assert_eq!(events(&drain(&mut bob_rx)), vec!["AnnotationUpdated"]);

        let frame = json!({
            "method": "BroadcastAnnotationDeletion",
            "sessionId": 3,
            "annotationId": row.data_id,
            "userId": "alice"
        });
        dispatch(&alice, &frame.to_string()).await.unwrap();
        assert!(drain(&mut carol_rx).is_empty());
        let frames = drain(&mut bob_rx);
        assert_eq!(events(&frames), vec!["AnnotationDeleted"]);
        assert_eq!(frames[0]["data"]["sessionId"], 2);
        drain(&mut alice_rx);
    }

    #[tokio::test]
    async fn test_clear_only_removes_callers_annotations() {
        let (store, _hub, [(alice, mut alice_rx), (_bob, _bob_rx)]) = setup().await;
        for owner in ["alice", "bob"] {
            store
                .insert_data(2, SessionDataType::Annotation, json!({}), Some(owner))
                .await
                .unwrap();
        }

        dispatch(
            &alice,
            r#"{"method":"BroadcastClearAnnotations","sessionId":2,"userId":"alice"}"#,
        )
        .await
        .unwrap();

        let frames = drain(&mut alice_rx);
        assert_eq!(events(&frames), vec!["AnnotationsCleared"]);
        assert_eq!(frames[0]["data"]["count"], 1);
        let left = store.data_of_type(2, SessionDataType::Annotation).await.unwrap();
        assert_eq!(left[0].created_by.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_annotation_for_unknown_session_is_rejected() {
        let (_store, _hub, [(alice, mut alice_rx), _]) = setup().await;
        dispatch(
            &alice,
            r#"{"method":"BroadcastAnnotation","sessionId":99,"userId":"alice","annotation":{}}"#,
        )
        .await
        .unwrap();
        assert_eq!(events(&drain(&mut alice_rx)), vec!["Error"]);
    }
}
