//! 进程内广播传输
//!
//! 单实例部署用的传输实现：发布即广播，订阅方拿到的事件流
//! 与真实网关推回的回声同构，消息同步层靠 ID 去重吸收。

use async_trait::async_trait;
use domain::{Message, MessageId, RoomId, UserId};
use tokio::sync::broadcast;

use application::transport::{MessageTransport, TransportError};

/// 广播线上的事件。
#[derive(Debug, Clone)]
pub enum WireEvent {
    Message(Message),
    MessageRead {
        room_id: RoomId,
        message_id: MessageId,
        reader: UserId,
    },
}

#[derive(Clone)]
pub struct LocalBroadcastTransport {
    sender: broadcast::Sender<WireEvent>,
}

impl LocalBroadcastTransport {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WireEvent> {
        self.sender.subscribe()
    }
}

impl Default for LocalBroadcastTransport {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl MessageTransport for LocalBroadcastTransport {
    async fn publish_message(&self, message: &Message) -> Result<(), TransportError> {
        self.sender
            .send(WireEvent::Message(message.clone()))
            .map_err(|err| TransportError::unavailable(err.to_string()))?;
        Ok(())
    }

    async fn publish_read(
        &self,
        room_id: RoomId,
        message_id: MessageId,
        reader: UserId,
    ) -> Result<(), TransportError> {
        self.sender
            .send(WireEvent::MessageRead {
                room_id,
                message_id,
                reader,
            })
            .map_err(|err| TransportError::unavailable(err.to_string()))?;
        Ok(())
    }
}
