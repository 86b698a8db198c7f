//! 聊天房间实体
//!
//! 每个匹配对加群组恰好创建一次，随匹配记录在同一事务内落库。

use serde::{Deserialize, Serialize};

use crate::value_objects::{GroupId, PairKey, RoomId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub pair: PairKey,
    pub group_id: GroupId,
    pub created_at: Timestamp,
}

impl Room {
    pub fn new(id: RoomId, pair: PairKey, group_id: GroupId, now: Timestamp) -> Self {
        Self {
            id,
            pair,
            group_id,
            created_at: now,
        }
    }

    pub fn participants(&self) -> [UserId; 2] {
        [self.pair.lo(), self.pair.hi()]
    }

    pub fn includes(&self, user: UserId) -> bool {
        self.pair.contains(user)
    }
}
