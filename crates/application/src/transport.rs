use async_trait::async_trait;
use domain::{Message, MessageId, RoomId, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// 出站传输接口。
///
/// 同步层只负责发布；服务端回声与对端消息通过
/// `ChatSyncService::ingest_incoming` 回流，同一条消息的回声靠
/// ID 去重吸收。
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn publish_message(&self, message: &Message) -> Result<(), TransportError>;

    async fn publish_read(
        &self,
        room_id: RoomId,
        message_id: MessageId,
        reader: UserId,
    ) -> Result<(), TransportError>;
}
