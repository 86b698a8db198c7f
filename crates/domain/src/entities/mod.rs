//! 核心实体定义

pub mod group;
pub mod interest;
pub mod match_record;
pub mod message;
pub mod room;
pub mod typing;
pub mod user;

pub use group::{Group, GroupType};
pub use interest::Interest;
pub use match_record::Match;
pub use message::{Message, MessageType};
pub use room::Room;
pub use typing::TypingSignal;
pub use user::User;
