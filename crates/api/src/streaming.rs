//! WebSocket streaming API.
//!
//! [`StreamingHub`] is the process-wide fan-out layer. It tracks every live
//! connection with its identity and room subscriptions, and implements
//! [`EventPublisher`] so services can push events without knowing about
//! sockets.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use axum::{
    extract::{
        FromRequestParts, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::request::Parts,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use pollroom_common::{AppError, AppResult};
use pollroom_core::{
    CreatePollInput, EventPublisher, Identity, PostMessageInput, RoomUser, StreamEvent, VoteInput,
};
use serde::Deserialize;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info, warn};

use crate::extractors::credential_from_headers;
use crate::middleware::AppState;

/// Identifier of one live connection.
pub type ConnectionId = u64;

/// Streaming query parameters.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Session credential.
    pub token: Option<String>,
}

/// Client-to-server message.
#[derive(Debug, Deserialize)]
#[serde(
    tag = "type",
    content = "body",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Subscribe to a room's events.
    JoinRoom { room_code: String },
    /// Unsubscribe from a room's events.
    LeaveRoom { room_code: String },
    /// Post a message to a room.
    RoomMessage { room_id: String, content: String },
    /// Create a poll.
    CreatePoll(CreatePollInput),
    /// Vote on a poll.
    SubmitVote(VoteInput),
    /// Close a poll.
    ClosePoll { poll_id: String },
    /// Delete a poll.
    DeletePoll { poll_id: String },
    /// Remove a member from a room.
    KickMember {
        room_code: String,
        user_id_to_kick: String,
    },
    /// Post a message to the public channel.
    PublicMessage { content: String },
}

struct Connection {
    identity: Identity,
    rooms: HashSet<String>,
    tx: mpsc::UnboundedSender<Message>,
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl HubState {
    fn room_users(&self, room_code: &str) -> Vec<RoomUser> {
        let mut users: Vec<RoomUser> = Vec::new();
        if let Some(ids) = self.rooms.get(room_code) {
            for id in ids {
                if let Some(conn) = self.connections.get(id)
                    && !users.iter().any(|u| u.user_id == conn.identity.id)
                {
                    users.push(RoomUser {
                        username: conn.identity.username.clone(),
                        user_id: conn.identity.id.clone(),
                    });
                }
            }
        }
        users.sort_by(|a, b| {
            a.username
                .cmp(&b.username)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        users
    }

    fn send_to_room(&self, room_code: &str, frame: &str) {
        let Some(ids) = self.rooms.get(room_code) else {
            return;
        };
        for id in ids {
            if let Some(conn) = self.connections.get(id) {
                // A closed receiver means the socket is shutting down; its
                // disconnect cleans the tables up.
                let _ = conn.tx.send(Message::Text(frame.to_owned().into()));
            }
        }
    }

    fn broadcast_presence(&self, room_code: &str) {
        match encode(&StreamEvent::RoomUsers(self.room_users(room_code))) {
            Ok(frame) => self.send_to_room(room_code, &frame),
            Err(e) => error!(error = %e, room_code = %room_code, "Failed to encode presence"),
        }
    }

    fn unsubscribe(&mut self, id: ConnectionId, room_code: &str) -> bool {
        let removed = self
            .connections
            .get_mut(&id)
            .is_some_and(|conn| conn.rooms.remove(room_code));

        if let Some(ids) = self.rooms.get_mut(room_code) {
            ids.remove(&id);
            if ids.is_empty() {
                self.rooms.remove(room_code);
            }
        }
        removed
    }
}

fn encode(event: &StreamEvent) -> AppResult<String> {
    serde_json::to_string(event)
        .map_err(|e| AppError::Internal(format!("Failed to encode {}: {e}", event.name())))
}

/// Shared state for streaming.
#[derive(Clone, Default)]
pub struct StreamingHub {
    state: Arc<RwLock<HubState>>,
    next_id: Arc<AtomicU64>,
}

impl StreamingHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticated connection and get its outbound queue.
    pub async fn register(
        &self,
        identity: Identity,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<Message>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();

        self.state.write().await.connections.insert(
            id,
            Connection {
                identity,
                rooms: HashSet::new(),
                tx,
            },
        );
        (id, rx)
    }

    /// Subscribe a connection to a room and resend the room's presence.
    pub async fn join(&self, id: ConnectionId, room_code: &str) {
        let mut state = self.state.write().await;
        let Some(conn) = state.connections.get_mut(&id) else {
            return;
        };
        conn.rooms.insert(room_code.to_string());
        state
            .rooms
            .entry(room_code.to_string())
            .or_default()
            .insert(id);

        state.broadcast_presence(room_code);
    }

    /// Unsubscribe a connection from a room and resend the room's presence.
    pub async fn leave(&self, id: ConnectionId, room_code: &str) {
        let mut state = self.state.write().await;
        if state.unsubscribe(id, room_code) {
            state.broadcast_presence(room_code);
        }
    }

    /// Forget a connection and resend presence to every room it had joined.
    pub async fn disconnect(&self, id: ConnectionId) {
        let mut state = self.state.write().await;
        let Some(conn) = state.connections.remove(&id) else {
            return;
        };

        for room_code in &conn.rooms {
            if let Some(ids) = state.rooms.get_mut(room_code) {
                ids.remove(&id);
                if ids.is_empty() {
                    state.rooms.remove(room_code);
                }
            }
            state.broadcast_presence(room_code);
        }
    }

    /// Send an event to one connection.
    pub async fn send_to(&self, id: ConnectionId, event: &StreamEvent) {
        let frame = match encode(event) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to encode event");
                return;
            }
        };
        if let Some(conn) = self.state.read().await.connections.get(&id) {
            let _ = conn.tx.send(Message::Text(frame.into()));
        }
    }

    async fn pong(&self, id: ConnectionId, data: axum::body::Bytes) {
        if let Some(conn) = self.state.read().await.connections.get(&id) {
            let _ = conn.tx.send(Message::Pong(data));
        }
    }

    /// Current presence of a room.
    pub async fn room_users(&self, room_code: &str) -> Vec<RoomUser> {
        self.state.read().await.room_users(room_code)
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }
}

#[async_trait]
impl EventPublisher for StreamingHub {
    async fn publish_to_room(&self, room_code: &str, event: StreamEvent) -> AppResult<()> {
        let frame = encode(&event)?;
        self.state.read().await.send_to_room(room_code, &frame);
        Ok(())
    }

    async fn publish_to_user(&self, user_id: &str, event: StreamEvent) -> AppResult<()> {
        let frame = encode(&event)?;
        let state = self.state.read().await;
        for conn in state
            .connections
            .values()
            .filter(|c| c.identity.id == user_id)
        {
            let _ = conn.tx.send(Message::Text(frame.clone().into()));
        }
        Ok(())
    }

    async fn publish_to_all(&self, event: StreamEvent) -> AppResult<()> {
        let frame = encode(&event)?;
        let state = self.state.read().await;
        for conn in state.connections.values() {
            let _ = conn.tx.send(Message::Text(frame.clone().into()));
        }
        Ok(())
    }

    async fn remove_user_from_room(&self, room_code: &str, user_id: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        let ids: Vec<ConnectionId> = state
            .connections
            .iter()
            .filter(|(_, c)| c.identity.id == user_id)
            .map(|(id, _)| *id)
            .collect();

        let mut changed = false;
        for id in ids {
            changed |= state.unsubscribe(id, room_code);
        }
        if changed {
            state.broadcast_presence(room_code);
        }
        Ok(())
    }
}

/// Identity of a streaming client, verified before the upgrade.
pub struct StreamIdentity(pub Identity);

impl FromRequestParts<AppState> for StreamIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<StreamQuery>::try_from_uri(&parts.uri)
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        let token = query
            .token
            .filter(|t| !t.is_empty())
            .or_else(|| credential_from_headers(&parts.headers))
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

        state.tokens.verify(&token).map(Self)
    }
}

/// WebSocket handler for streaming.
pub async fn streaming_handler(
    StreamIdentity(identity): StreamIdentity,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    info!(user_id = %identity.id, "New streaming connection");

    ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, identity: Identity, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut outbound) = state.hub.register(identity.clone()).await;

    info!(user_id = %identity.id, conn_id, "Streaming connection established");

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(&state, conn_id, &identity, client_msg).await;
                }
                Err(e) => {
                    warn!(error = %e, conn_id, "Failed to parse client message");
                }
            },
            Ok(Message::Close(_)) => {
                info!(conn_id, "Client closed connection");
                break;
            }
            Ok(Message::Ping(data)) => {
                state.hub.pong(conn_id, data).await;
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, conn_id, "WebSocket error");
                break;
            }
        }
    }

    state.hub.disconnect(conn_id).await;
    writer.abort();

    info!(user_id = %identity.id, conn_id, "Streaming connection closed");
}

/// Handle a client message.
async fn handle_client_message(
    state: &AppState,
    conn_id: ConnectionId,
    identity: &Identity,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::JoinRoom { room_code } => {
            debug!(conn_id, room_code = %room_code, "Joined room channel");
            state.hub.join(conn_id, &room_code).await;
        }
        ClientMessage::LeaveRoom { room_code } => {
            debug!(conn_id, room_code = %room_code, "Left room channel");
            state.hub.leave(conn_id, &room_code).await;
        }
        ClientMessage::RoomMessage { room_id, content } => {
            let input = PostMessageInput {
                content,
                room_id: Some(room_id),
            };
            if let Err(e) = state.chat_service.post(identity, input).await {
                warn!(error = %e, user_id = %identity.id, "Room message rejected");
            }
        }
        ClientMessage::PublicMessage { content } => {
            let input = PostMessageInput {
                content,
                room_id: None,
            };
            if let Err(e) = state.chat_service.post(identity, input).await {
                warn!(error = %e, user_id = %identity.id, "Public message rejected");
            }
        }
        ClientMessage::CreatePoll(input) => {
            if let Err(e) = state.poll_service.create_poll(identity, input).await {
                reply_error(state, conn_id, &e, |message| StreamEvent::PollError { message }).await;
            }
        }
        ClientMessage::SubmitVote(input) => {
            if let Err(e) = state.poll_service.vote(identity, input).await {
                reply_error(state, conn_id, &e, |message| StreamEvent::VoteError { message }).await;
            }
        }
        ClientMessage::ClosePoll { poll_id } => {
            if let Err(e) = state.poll_service.close_poll(identity, &poll_id).await {
                reply_error(state, conn_id, &e, |message| StreamEvent::PollError { message }).await;
            }
        }
        ClientMessage::DeletePoll { poll_id } => {
            if let Err(e) = state.poll_service.delete_poll(identity, &poll_id).await {
                reply_error(state, conn_id, &e, |message| StreamEvent::PollError { message }).await;
            }
        }
        ClientMessage::KickMember {
            room_code,
            user_id_to_kick,
        } => {
            if let Err(e) = state
                .room_service
                .kick(identity, &room_code, &user_id_to_kick)
                .await
            {
                reply_error(state, conn_id, &e, |message| StreamEvent::KickError { message }).await;
            }
        }
    }
}

/// Report a failed request to the connection that made it.
async fn reply_error(
    state: &AppState,
    conn_id: ConnectionId,
    err: &AppError,
    event: impl FnOnce(String) -> StreamEvent,
) {
    if err.is_server_error() {
        error!(error = %err, conn_id, "Streaming request failed");
    } else {
        debug!(error = %err, conn_id, "Streaming request rejected");
    }
    state.hub.send_to(conn_id, &event(err.public_message())).await;
}
