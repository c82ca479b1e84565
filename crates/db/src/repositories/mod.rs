//! Repositories wrapping store access per aggregate.

mod message;
mod poll;
mod room;
mod user;

pub use message::MessageRepository;
pub use poll::PollRepository;
pub use room::RoomRepository;
pub use user::UserRepository;
