//! Event publisher service.
//!
//! Provides an abstraction for pushing real-time events to live connections.
//! The actual implementation is the streaming hub in the api crate; services
//! receive it as an injected [`EventPublisherService`] handle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pollroom_common::AppResult;
use serde::Serialize;
use std::sync::Arc;

use crate::services::chat::{MentionNotice, MessageView};
use crate::services::poll::PollView;

/// One entry of a room presence snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUser {
    pub username: String,
    pub user_id: String,
}

/// Server-to-client events.
///
/// Serialised as `{ "type": "<eventName>", "body": { .. } }`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StreamEvent {
    /// Full presence snapshot of a room.
    RoomUsers(Vec<RoomUser>),
    /// A user became a member of a room.
    UserJoined {
        user_id: String,
        username: String,
        room_code: String,
    },
    /// A user left a room.
    UserLeft {
        user_id: String,
        username: String,
        room_code: String,
    },
    /// A message was posted in a room.
    NewRoomMessage(MessageView),
    /// The recipient was mentioned in a room message.
    MentionNotification(MentionNotice),
    /// A poll was created.
    NewPoll(PollView),
    /// Current tallies of a poll.
    PollResults(PollView),
    /// A poll was closed.
    PollClosed { poll_id: String, auto_closed: bool },
    /// A poll was deleted.
    PollDeleted { poll_id: String },
    /// A poll the recipient can see has ended.
    PollExpired {
        poll_id: String,
        room_code: String,
        message: String,
        has_voted: bool,
    },
    /// A poll the recipient can see ends soon.
    PollExpiringSoon {
        poll_id: String,
        room_code: String,
        deadline: DateTime<Utc>,
        message: String,
        has_voted: bool,
    },
    /// Someone voted on a poll in the recipient's room.
    VoteNotification {
        poll_id: String,
        poll_question: String,
        voted_by: String,
        room_code: String,
        room_id: String,
    },
    /// A member was removed from a room. `kicked_by` is the creator's username.
    MemberKicked {
        kicked_user_id: String,
        kicked_by: String,
    },
    /// The recipient was removed from a room.
    Kicked { room_code: String },
    /// A vote request from this connection failed.
    VoteError { message: String },
    /// A poll request from this connection failed.
    PollError { message: String },
    /// A kick request from this connection failed.
    KickError { message: String },
    /// A message was posted in the public channel.
    NewPublicMessage(MessageView),
}

impl StreamEvent {
    /// The wire name of this event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RoomUsers(_) => "roomUsers",
            Self::UserJoined { .. } => "userJoined",
            Self::UserLeft { .. } => "userLeft",
            Self::NewRoomMessage(_) => "newRoomMessage",
            Self::MentionNotification(_) => "mentionNotification",
            Self::NewPoll(_) => "newPoll",
            Self::PollResults(_) => "pollResults",
            Self::PollClosed { .. } => "pollClosed",
            Self::PollDeleted { .. } => "pollDeleted",
            Self::PollExpired { .. } => "pollExpired",
            Self::PollExpiringSoon { .. } => "pollExpiringSoon",
            Self::VoteNotification { .. } => "voteNotification",
            Self::MemberKicked { .. } => "memberKicked",
            Self::Kicked { .. } => "kicked",
            Self::VoteError { .. } => "voteError",
            Self::PollError { .. } => "pollError",
            Self::KickError { .. } => "kickError",
            Self::NewPublicMessage(_) => "newPublicMessage",
        }
    }
}

/// Trait for publishing real-time events.
///
/// This allows the core services to publish events
/// without directly depending on the transport.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Send an event to every connection subscribed to a room.
    async fn publish_to_room(&self, room_code: &str, event: StreamEvent) -> AppResult<()>;

    /// Send an event to every connection of a user.
    async fn publish_to_user(&self, user_id: &str, event: StreamEvent) -> AppResult<()>;

    /// Send an event to every connection.
    async fn publish_to_all(&self, event: StreamEvent) -> AppResult<()>;

    /// Drop a user's connections from a room subscription and resend presence.
    async fn remove_user_from_room(&self, room_code: &str, user_id: &str) -> AppResult<()>;
}

/// A no-op implementation of `EventPublisher` for testing or when real-time events are disabled.
#[derive(Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish_to_room(&self, _room_code: &str, _event: StreamEvent) -> AppResult<()> {
        Ok(())
    }

    async fn publish_to_user(&self, _user_id: &str, _event: StreamEvent) -> AppResult<()> {
        Ok(())
    }

    async fn publish_to_all(&self, _event: StreamEvent) -> AppResult<()> {
        Ok(())
    }

    async fn remove_user_from_room(&self, _room_code: &str, _user_id: &str) -> AppResult<()> {
        Ok(())
    }
}

/// Wrapper for boxed `EventPublisher` trait object.
pub type EventPublisherService = Arc<dyn EventPublisher>;

/// Fire-and-log helpers.
///
/// A mutation that already reached the store is never undone because a
/// broadcast failed, so these log at `warn` and return nothing.
pub(crate) mod emit {
    use super::{EventPublisherService, StreamEvent};
    use tracing::warn;

    pub async fn to_room(publisher: &EventPublisherService, room_code: &str, event: StreamEvent) {
        let name = event.name();
        if let Err(e) = publisher.publish_to_room(room_code, event).await {
            warn!(error = %e, event = name, room_code = %room_code, "Failed to publish room event");
        }
    }

    pub async fn to_user(publisher: &EventPublisherService, user_id: &str, event: StreamEvent) {
        let name = event.name();
        if let Err(e) = publisher.publish_to_user(user_id, event).await {
            warn!(error = %e, event = name, user_id = %user_id, "Failed to publish user event");
        }
    }

    pub async fn to_all(publisher: &EventPublisherService, event: StreamEvent) {
        let name = event.name();
        if let Err(e) = publisher.publish_to_all(event).await {
            warn!(error = %e, event = name, "Failed to publish broadcast event");
        }
    }
}

/// Recording publisher for service tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::{EventPublisher, StreamEvent};
    use async_trait::async_trait;
    use pollroom_common::AppResult;
    use std::sync::Mutex;

    /// Where an event was sent.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Target {
        Room(String),
        User(String),
        All,
    }

    #[derive(Default)]
    pub struct RecordingPublisher {
        pub events: Mutex<Vec<(Target, StreamEvent)>>,
        pub removals: Mutex<Vec<(String, String)>>,
    }

    impl RecordingPublisher {
        #[allow(clippy::unwrap_used)]
        pub fn names_for(&self, target: &Target) -> Vec<&'static str> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| t == target)
                .map(|(_, e)| e.name())
                .collect()
        }

        #[allow(clippy::unwrap_used)]
        pub fn all(&self) -> Vec<(Target, StreamEvent)> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    #[allow(clippy::unwrap_used)]
    impl EventPublisher for RecordingPublisher {
        async fn publish_to_room(&self, room_code: &str, event: StreamEvent) -> AppResult<()> {
            self.events
                .lock()
                .unwrap()
                .push((Target::Room(room_code.to_string()), event));
            Ok(())
        }

        async fn publish_to_user(&self, user_id: &str, event: StreamEvent) -> AppResult<()> {
            self.events
                .lock()
                .unwrap()
                .push((Target::User(user_id.to_string()), event));
            Ok(())
        }

        async fn publish_to_all(&self, event: StreamEvent) -> AppResult<()> {
            self.events.lock().unwrap().push((Target::All, event));
            Ok(())
        }

        async fn remove_user_from_room(&self, room_code: &str, user_id: &str) -> AppResult<()> {
            self.removals
                .lock()
                .unwrap()
                .push((room_code.to_string(), user_id.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = StreamEvent::PollClosed {
            poll_id: "p1".to_string(),
            auto_closed: true,
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "pollClosed");
        assert_eq!(json["body"]["pollId"], "p1");
        assert_eq!(json["body"]["autoClosed"], true);
    }

    #[test]
    fn test_event_name_matches_serialized_tag() {
        let events = [
            StreamEvent::RoomUsers(vec![]),
            StreamEvent::Kicked {
                room_code: "ABC123".to_string(),
            },
            StreamEvent::MemberKicked {
                kicked_user_id: "u2".to_string(),
                kicked_by: "alice".to_string(),
            },
            StreamEvent::VoteError {
                message: "Poll is closed".to_string(),
            },
        ];

        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.name());
        }
    }

    #[test]
    fn test_room_users_body_is_array() {
        let event = StreamEvent::RoomUsers(vec![RoomUser {
            username: "alice".to_string(),
            user_id: "u1".to_string(),
        }]);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["body"][0]["userId"], "u1");
        assert_eq!(json["body"][0]["username"], "alice");
    }
}
