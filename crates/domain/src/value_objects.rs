use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

/// 用户唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<UserId> for Uuid {
    fn from(value: UserId) -> Self {
        value.0
    }
}

/// 群组唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub Uuid);

impl GroupId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for GroupId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<GroupId> for Uuid {
    fn from(value: GroupId) -> Self {
        value.0
    }
}

/// 聊天房间唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub Uuid);

impl RoomId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RoomId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<RoomId> for Uuid {
    fn from(value: RoomId) -> Self {
        value.0
    }
}

/// 消息唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<MessageId> for Uuid {
    fn from(value: MessageId) -> Self {
        value.0
    }
}

/// 经过验证的昵称。
///
/// 匹配成立之前昵称对另一方不可见，解析权限由应用层控制。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nickname(String);

impl Nickname {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("nickname", "cannot be empty"));
        }
        if value.chars().count() > 30 {
            return Err(DomainError::invalid_argument("nickname", "too long"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nickname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 消息正文内容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent(String);

impl MessageContent {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::invalid_argument(
                "message_content",
                "cannot be empty",
            ));
        }
        if value.chars().count() > 2000 {
            return Err(DomainError::invalid_argument("message_content", "too long"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 无序用户对，按 UUID 大小归一化为 (lo, hi)。
///
/// 匹配与房间的唯一约束都建立在这个归一化键上，保证同一对用户
/// 在同一群组内至多产生一条匹配记录。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairKey {
    lo: UserId,
    hi: UserId,
}

impl PairKey {
    pub fn new(a: UserId, b: UserId) -> Result<Self, DomainError> {
        if a == b {
            return Err(DomainError::invalid_argument(
                "pair",
                "cannot pair a user with themselves",
            ));
        }
        if Uuid::from(a) <= Uuid::from(b) {
            Ok(Self { lo: a, hi: b })
        } else {
            Ok(Self { lo: b, hi: a })
        }
    }

    pub fn lo(&self) -> UserId {
        self.lo
    }

    pub fn hi(&self) -> UserId {
        self.hi
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.lo == user || self.hi == user
    }

    /// 返回对中的另一方。
    pub fn other(&self, user: UserId) -> Option<UserId> {
        if user == self.lo {
            Some(self.hi)
        } else if user == self.hi {
            Some(self.lo)
        } else {
            None
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.lo, self.hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_order_independent() {
        let a = UserId::new(Uuid::new_v4());
        let b = UserId::new(Uuid::new_v4());

        let forward = PairKey::new(a, b).unwrap();
        let backward = PairKey::new(b, a).unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward.to_string(), backward.to_string());
        assert!(forward.contains(a));
        assert!(forward.contains(b));
        assert_eq!(forward.other(a), Some(b));
        assert_eq!(forward.other(b), Some(a));
    }

    #[test]
    fn pair_key_rejects_self_pair() {
        let a = UserId::new(Uuid::new_v4());
        assert!(PairKey::new(a, a).is_err());
    }

    #[test]
    fn nickname_validation() {
        assert!(Nickname::parse("밤하늘").is_ok());
        assert!(Nickname::parse("  ").is_err());
        assert!(Nickname::parse("a".repeat(31)).is_err());
    }

    #[test]
    fn message_content_validation() {
        assert!(MessageContent::new("hello").is_ok());
        assert!(MessageContent::new("").is_err());
        assert!(MessageContent::new("a".repeat(2001)).is_err());
    }
}
