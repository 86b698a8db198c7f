//! 消息实体
//!
//! 消息创建后内容不再变化，唯一允许的变更是已读状态的单向翻转。

use serde::{Deserialize, Serialize};

use crate::value_objects::{MessageContent, MessageId, RoomId, Timestamp, UserId};

/// 消息类型枚举
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    /// 文本消息
    Text,
    /// 图片消息
    Image { url: String },
    /// 表情消息
    Emoji { shortcode: String },
}

impl Default for MessageType {
    fn default() -> Self {
        Self::Text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub message_type: MessageType,
    pub created_at: Timestamp,
    pub is_read: bool,
    pub read_by: Vec<UserId>,
}

impl Message {
    pub fn new(
        id: MessageId,
        room_id: RoomId,
        sender_id: UserId,
        content: MessageContent,
        message_type: MessageType,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            room_id,
            sender_id,
            content,
            message_type,
            created_at: now,
            is_read: false,
            read_by: Vec::new(),
        }
    }

    /// 记录某个用户的已读。幂等且单调：重复标记返回 `false`，
    /// 已读永远不会退回未读。
    pub fn mark_read_by(&mut self, reader: UserId) -> bool {
        if self.read_by.contains(&reader) {
            return false;
        }
        self.read_by.push(reader);
        self.is_read = true;
        true
    }

    pub fn is_read_by(&self, user: UserId) -> bool {
        self.read_by.contains(&user)
    }

    /// 通知预览用的截断内容。
    pub fn preview(&self, max_chars: usize) -> String {
        let content = self.content.as_str();
        if content.chars().count() <= max_chars {
            content.to_owned()
        } else {
            let truncated: String = content.chars().take(max_chars).collect();
            format!("{truncated}...")
        }
    }
}
