//! Chat service.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use pollroom_common::{AppError, AppResult, IdGenerator};
use pollroom_db::{
    entities::{mention, message, room, user},
    repositories::{MessageRepository, RoomRepository, UserRepository},
};
use regex::Regex;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::Validate;

use crate::services::auth::Identity;
use crate::services::event_publisher::{EventPublisherService, StreamEvent, emit};

/// How many recent room messages define the set of mentionable users.
pub const MENTION_WINDOW: u64 = 100;

/// Public channel history size.
pub const PUBLIC_HISTORY_LIMIT: u64 = 20;

/// Room history size.
pub const ROOM_HISTORY_LIMIT: u64 = 50;

/// How many mentions [`ChatService::mentions_for`] returns.
pub const MENTIONS_LIMIT: u64 = 10;

#[allow(clippy::unwrap_used)]
static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@(\w+)").unwrap());

/// Usernames referenced as `@name`, de-duplicated in order of appearance.
#[must_use]
pub fn extract_mentions(content: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for cap in MENTION_RE.captures_iter(content) {
        let name = &cap[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Input for posting a message.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageInput {
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
    #[serde(default)]
    pub room_id: Option<String>,
}

/// A message as shown in history and live feeds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub content: String,
    pub user_id: String,
    pub username: String,
    pub room_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub mentions: Vec<String>,
}

/// Live notification sent to a mentioned user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionNotice {
    pub message_id: String,
    pub content: String,
    pub from_user: String,
    pub room_id: String,
    pub room_code: String,
    pub room_name: String,
}

/// Minimal room reference.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub id: String,
    pub name: String,
    pub code: String,
}

/// A stored mention of the calling user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionView {
    pub id: String,
    pub message_id: String,
    pub content: String,
    pub from_user: String,
    pub room: Option<RoomRef>,
    pub created_at: DateTime<Utc>,
}

/// Chat service for business logic.
#[derive(Clone)]
pub struct ChatService {
    message_repo: MessageRepository,
    user_repo: UserRepository,
    room_repo: RoomRepository,
    publisher: EventPublisherService,
    id_gen: IdGenerator,
}

impl ChatService {
    /// Create a new chat service.
    #[must_use]
    pub const fn new(
        message_repo: MessageRepository,
        user_repo: UserRepository,
        room_repo: RoomRepository,
        publisher: EventPublisherService,
    ) -> Self {
        Self {
            message_repo,
            user_repo,
            room_repo,
            publisher,
            id_gen: IdGenerator::new(),
        }
    }

    /// Post a message to a room, or to the public channel when no room is given.
    pub async fn post(&self, author: &Identity, input: PostMessageInput) -> AppResult<MessageView> {
        input.validate()?;

        let content = input.content.trim().to_string();
        if content.is_empty() {
            return Err(AppError::Validation("Message content is required".to_string()));
        }

        let room = match input.room_id.as_deref() {
            Some(room_id) => Some(self.room_repo.get_by_id(room_id).await?),
            None => None,
        };

        let now = Utc::now();
        let saved = self
            .message_repo
            .create(message::ActiveModel {
                id: Set(self.id_gen.generate()),
                user_id: Set(author.id.clone()),
                room_id: Set(room.as_ref().map(|r| r.id.clone())),
                content: Set(content),
                created_at: Set(now.into()),
            })
            .await?;

        let Some(room) = room else {
            let view = message_view(&saved, &author.username, vec![]);
            info!(message_id = %saved.id, user_id = %author.id, "Public message posted");
            emit::to_all(&self.publisher, StreamEvent::NewPublicMessage(view.clone())).await;
            return Ok(view);
        };

        let mentioned = self.record_mentions(&saved, &room).await?;
        let view = message_view(
            &saved,
            &author.username,
            mentioned.iter().map(|u| u.username.clone()).collect(),
        );

        info!(
            message_id = %saved.id,
            room_id = %room.id,
            mentions = mentioned.len(),
            "Room message posted"
        );

        emit::to_room(
            &self.publisher,
            &room.code,
            StreamEvent::NewRoomMessage(view.clone()),
        )
        .await;

        for target in &mentioned {
            emit::to_user(
                &self.publisher,
                &target.id,
                StreamEvent::MentionNotification(MentionNotice {
                    message_id: saved.id.clone(),
                    content: saved.content.clone(),
                    from_user: author.username.clone(),
                    room_id: room.id.clone(),
                    room_code: room.code.clone(),
                    room_name: room.name.clone(),
                }),
            )
            .await;
        }

        Ok(view)
    }

    /// Recent history, oldest first.
    pub async fn recent(&self, room_id: Option<&str>) -> AppResult<Vec<MessageView>> {
        let limit = if room_id.is_some() {
            ROOM_HISTORY_LIMIT
        } else {
            PUBLIC_HISTORY_LIMIT
        };

        let mut messages = self.message_repo.find_recent(room_id, limit).await?;
        messages.reverse();
        if messages.is_empty() {
            return Ok(vec![]);
        }

        let authors = self.usernames_of(messages.iter().map(|m| m.user_id.clone())).await?;

        let message_ids: Vec<String> = messages.iter().map(|m| m.id.clone()).collect();
        let mut mentions: HashMap<String, Vec<String>> = HashMap::new();
        for m in self
            .message_repo
            .find_mentions_for_messages(&message_ids)
            .await?
        {
            mentions.entry(m.message_id).or_default().push(m.username);
        }

        Ok(messages
            .iter()
            .map(|m| {
                let username = authors.get(&m.user_id).map_or("", String::as_str);
                message_view(m, username, mentions.remove(&m.id).unwrap_or_default())
            })
            .collect())
    }

    /// The newest mentions of a user.
    pub async fn mentions_for(&self, user_id: &str) -> AppResult<Vec<MentionView>> {
        let mentions = self
            .message_repo
            .find_mentions_by_user(user_id, MENTIONS_LIMIT)
            .await?;
        if mentions.is_empty() {
            return Ok(vec![]);
        }

        let message_ids: Vec<String> = mentions.iter().map(|m| m.message_id.clone()).collect();
        let messages: HashMap<String, message::Model> = self
            .message_repo
            .find_by_ids(&message_ids)
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let authors = self
            .usernames_of(messages.values().map(|m| m.user_id.clone()))
            .await?;

        let mut room_ids: Vec<String> = messages.values().filter_map(|m| m.room_id.clone()).collect();
        room_ids.sort();
        room_ids.dedup();
        let rooms: HashMap<String, room::Model> = self
            .room_repo
            .find_by_ids(&room_ids)
            .await?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        Ok(mentions
            .into_iter()
            .filter_map(|m| {
                let msg = messages.get(&m.message_id)?;
                Some(MentionView {
                    id: m.id,
                    message_id: m.message_id,
                    content: msg.content.clone(),
                    from_user: authors.get(&msg.user_id).cloned().unwrap_or_default(),
                    room: msg
                        .room_id
                        .as_ref()
                        .and_then(|id| rooms.get(id))
                        .map(|r| RoomRef {
                            id: r.id.clone(),
                            name: r.name.clone(),
                            code: r.code.clone(),
                        }),
                    created_at: m.created_at.with_timezone(&Utc),
                })
            })
            .collect())
    }

    /// Resolve `@name` tokens against the room's recent authors and store them.
    async fn record_mentions(
        &self,
        saved: &message::Model,
        room: &room::Model,
    ) -> AppResult<Vec<user::Model>> {
        let names = extract_mentions(&saved.content);
        if names.is_empty() {
            return Ok(vec![]);
        }

        let recent = self
            .message_repo
            .recent_author_ids(&room.id, MENTION_WINDOW)
            .await?;
        let found = self
            .user_repo
            .find_by_usernames_within(&recent, &names)
            .await?;

        // Keep the order the names appeared in the message.
        let mentioned: Vec<user::Model> = names
            .iter()
            .filter_map(|n| found.iter().find(|u| &u.username == n).cloned())
            .collect();

        debug!(
            message_id = %saved.id,
            requested = names.len(),
            resolved = mentioned.len(),
            "Resolved mentions"
        );

        self.message_repo
            .create_mentions(
                mentioned
                    .iter()
                    .map(|u| mention::ActiveModel {
                        id: Set(self.id_gen.generate()),
                        message_id: Set(saved.id.clone()),
                        user_id: Set(u.id.clone()),
                        username: Set(u.username.clone()),
                        created_at: Set(saved.created_at),
                    })
                    .collect(),
            )
            .await?;

        Ok(mentioned)
    }

    async fn usernames_of(
        &self,
        ids: impl Iterator<Item = String>,
    ) -> AppResult<HashMap<String, String>> {
        let mut ids: Vec<String> = ids.collect();
        ids.sort();
        ids.dedup();

        Ok(self
            .user_repo
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect())
    }
}

fn message_view(msg: &message::Model, username: &str, mentions: Vec<String>) -> MessageView {
    MessageView {
        id: msg.id.clone(),
        content: msg.content.clone(),
        user_id: msg.user_id.clone(),
        username: username.to_string(),
        room_id: msg.room_id.clone(),
        created_at: msg.created_at.with_timezone(&Utc),
        mentions,
    }
}
