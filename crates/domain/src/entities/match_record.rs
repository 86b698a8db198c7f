//! 匹配记录
//!
//! 双向兴趣成立时由引擎创建，不可变。每个 (无序对, 群组) 至多一条，
//! 由存储层唯一约束兜底。

use serde::{Deserialize, Serialize};

use crate::value_objects::{GroupId, PairKey, RoomId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub pair: PairKey,
    pub group_id: GroupId,
    pub room_id: RoomId,
    pub matched_at: Timestamp,
}

impl Match {
    pub fn new(pair: PairKey, group_id: GroupId, room_id: RoomId, matched_at: Timestamp) -> Self {
        Self {
            pair,
            group_id,
            room_id,
            matched_at,
        }
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.pair.contains(user)
    }

    /// 匹配中相对某一方的另一方。
    pub fn counterpart_of(&self, user: UserId) -> Option<UserId> {
        self.pair.other(user)
    }
}
