//! In-process connection and group registry behind the WebSocket hubs.
//!
//! Every connection owns an unbounded queue of outgoing text frames. Handlers
//! on any worker push events into those queues by connection id or group name.

pub mod annotation;
pub mod qa;
pub mod session;
pub mod ws;

use crate::ServiceError;
use crate::store::CanvasStore;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};
use uuid::Uuid;

pub type ConnectionId = Uuid;

pub fn session_group(session_id: i64) -> String {
    format!("session_{}", session_id)
}

pub fn host_group(session_id: i64) -> String {
    format!("Host_{}", session_id)
}

pub fn usertoken_group(user_token: &str) -> String {
    format!("usertoken_{}", user_token)
}

pub fn qa_group(session_id: i64) -> String {
    format!("qa_session_{}", session_id)
}

pub fn annotation_group(session_id: i64) -> String {
    format!("annotations_{}", session_id)
}

/// Outgoing frame: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HubEvent {
    pub event: String,
    pub data: Value,
}

impl HubEvent {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("Error", serde_json::json!({ "message": message.into() }))
    }

    fn to_frame(&self) -> Result<String, ServiceError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, UnboundedSender<String>>,
    groups: HashMap<String, HashSet<ConnectionId>>,
}

#[derive(Clone, Default)]
pub struct Hub {
    state: Arc<RwLock<HubState>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self) -> (ConnectionId, UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.write().await.connections.insert(id, tx);
        debug!("Hub connection {} opened", id);
        (id, rx)
    }

    /// Drops the connection and its group memberships. Returns the groups it was in.
    pub async fn disconnect(&self, id: ConnectionId) -> Vec<String> {
        let mut state = self.state.write().await;
        state.connections.remove(&id);
        let mut left = Vec::new();
        state.groups.retain(|name, members| {
            if members.remove(&id) {
                left.push(name.clone());
            }
            !members.is_empty()
        });
        debug!("Hub connection {} closed", id);
        left
    }

    pub async fn add_to_group(&self, id: ConnectionId, group: &str) {
        self.state
            .write()
            .await
            .groups
            .entry(group.to_string())
            .or_default()
            .insert(id);
    }

    pub async fn remove_from_group(&self, id: ConnectionId, group: &str) {
        let mut state = self.state.write().await;
        if let Some(members) = state.groups.get_mut(group) {
            members.remove(&id);
            if members.is_empty() {
                state.groups.remove(group);
            }
        }
    }

    pub async fn group_size(&self, group: &str) -> usize {
        self.state
            .read()
            .await
            .groups
            .get(group)
            .map_or(0, HashSet::len)
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    pub async fn send_to(&self, id: ConnectionId, event: &HubEvent) -> Result<bool, ServiceError> {
        let frame = event.to_frame()?;
        let state = self.state.read().await;
        Ok(state
            .connections
            .get(&id)
            .is_some_and(|tx| tx.send(frame).is_ok()))
    }

    /// Returns how many connections the event was queued for.
    pub async fn send_to_group(&self, group: &str, event: &HubEvent) -> Result<usize, ServiceError> {
        self.fan_out(group, None, event).await
    }

    pub async fn send_to_group_except(
        &self,
        group: &str,
        except: ConnectionId,
        event: &HubEvent,
    ) -> Result<usize, ServiceError> {
        self.fan_out(group, Some(except), event).await
    }

    async fn fan_out(
        &self,
        group: &str,
        except: Option<ConnectionId>,
        event: &HubEvent,
    ) -> Result<usize, ServiceError> {
        let frame = event.to_frame()?;
        let state = self.state.read().await;
        let Some(members) = state.groups.get(group) else {
            return Ok(0);
        };

        let mut delivered = 0;
        for id in members.iter().filter(|id| Some(**id) != except) {
            match state.connections.get(id) {
                Some(tx) if tx.send(frame.clone()).is_ok() => delivered += 1,
                _ => warn!("Dropping {} for closed connection {}", event.event, id),
            }
        }
        debug!("{} -> {} ({} receivers)", event.event, group, delivered);
        Ok(delivered)
    }

    /// Broadcast from an HTTP handler. Failures are logged, never returned.
    pub async fn notify_group(&self, group: &str, event: HubEvent) {
        if let Err(e) = self.send_to_group(group, &event).await {
            warn!("Failed to broadcast {} to {}: {}", event.event, group, e);
        }
    }
}

/// What a hub method handler needs: the registry, the store, and who is calling.
#[derive(Clone)]
pub struct HubContext {
    pub hub: Hub,
    pub store: CanvasStore,
    pub connection: ConnectionId,
}

impl HubContext {
    pub async fn reply(&self, event: HubEvent) -> Result<(), ServiceError> {
        self.hub.send_to(self.connection, &event).await?;
        Ok(())
    }

    pub async fn broadcast(&self, group: &str, event: HubEvent) -> Result<usize, ServiceError> {
        self.hub.send_to_group(group, &event).await
    }

    pub async fn broadcast_others(&self, group: &str, event: HubEvent) -> Result<usize, ServiceError> {
        self.hub
            .send_to_group_except(group, self.connection, &event)
            .await
    }

    pub async fn join(&self, group: &str) {
        self.hub.add_to_group(self.connection, group).await;
    }

    pub async fn leave(&self, group: &str) {
        self.hub.remove_from_group(self.connection, group).await;
    }
}

/// Parses a client frame, replying with an `Error` event when it is not understood.
pub(crate) async fn parse_request<T: serde::de::DeserializeOwned>(
    ctx: &HubContext,
    frame: &str,
) -> Result<Option<T>, ServiceError> {
    match serde_json::from_str(frame) {
        Ok(request) => Ok(Some(request)),
        Err(e) => {
            debug!("Rejected hub frame from {}: {}", ctx.connection, e);
            ctx.reply(HubEvent::error(format!("Unrecognised message: {}", e)))
                .await?;
            Ok(None)
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub(crate) fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(&frame).expect("frames are json"));
        }
        frames
    }

    pub(crate) fn events(frames: &[Value]) -> Vec<&str> {
        frames.iter().filter_map(|f| f["event"].as_str()).collect()
    }
}
