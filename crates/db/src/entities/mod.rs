//! Database entities.

#![allow(missing_docs)]

pub mod mention;
pub mod message;
pub mod poll;
pub mod poll_option;
pub mod room;
pub mod room_member;
pub mod user;
pub mod vote;

pub use mention::Entity as Mention;
pub use message::Entity as Message;
pub use poll::Entity as Poll;
pub use poll_option::Entity as PollOption;
pub use room::Entity as Room;
pub use room_member::Entity as RoomMember;
pub use user::Entity as User;
pub use vote::Entity as Vote;
