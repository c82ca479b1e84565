//! Business logic services.

#![allow(missing_docs)]

pub mod auth;
pub mod chat;
pub mod event_publisher;
pub mod poll;
pub mod room;
pub mod scheduler;
pub mod user;

pub use auth::{Claims, Identity, TokenService, hash_password, verify_password};
pub use chat::{
    ChatService, MentionNotice, MentionView, MessageView, PostMessageInput, RoomRef,
    extract_mentions,
};
pub use event_publisher::{
    EventPublisher, EventPublisherService, NoOpEventPublisher, RoomUser, StreamEvent,
};
pub use poll::{
    CreatePollInput, PollOptionView, PollPhase, PollService, PollView, VoteInput, parse_deadline,
};
pub use room::{CreateRoomInput, RoomDetail, RoomService, RoomSummary, UpdateRoomInput};
pub use scheduler::{PollScheduler, SchedulerSettings, TickReport};
pub use user::{LoginInput, LoginResult, RegisterInput, UserProfile, UserService, UserSummary};
