//! 应用层实现。
//!
//! 围绕领域模型的用例服务：匹配引擎、消息同步层、输入中状态跟踪，
//! 以及对外部适配器（存储、推送、传输、违规日志）的抽象。

pub mod clock;
pub mod error;
pub mod moderation;
pub mod notifier;
pub mod presence;
pub mod repository;
pub mod services;
pub mod transport;

pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use moderation::{ModerationGate, ViolationRecord, ViolationSink};
pub use notifier::{MatchNotifier, NotifyError};
pub use presence::{TypingSweeper, TypingTracker};
pub use repository::{
    GroupRepository, InterestRepository, InterestWrite, MatchRepository, MatchWrite,
    MessageCursor, MessageRepository, UserRepository,
};
pub use services::{
    ChatSyncService, ChatSyncServiceDependencies, ExpressInterestRequest, InterestOutcome,
    MatchService, MatchServiceDependencies, ResyncSummary, SendMessageRequest, SendOutcome,
};
pub use transport::{MessageTransport, TransportError};
