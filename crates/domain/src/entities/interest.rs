//! 兴趣（单向点赞）实体
//!
//! 创建后不可变更、不可删除。(from, to, group) 三元组唯一，
//! 重复表达同一兴趣是幂等操作。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{GroupId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub group_id: GroupId,
    pub created_at: Timestamp,
}

impl Interest {
    pub fn new(
        from_user_id: UserId,
        to_user_id: UserId,
        group_id: GroupId,
        now: Timestamp,
    ) -> DomainResult<Self> {
        if from_user_id == to_user_id {
            return Err(DomainError::invalid_argument(
                "to_user_id",
                "cannot express interest in yourself",
            ));
        }
        Ok(Self {
            from_user_id,
            to_user_id,
            group_id,
            created_at: now,
        })
    }

    /// 是否与另一条兴趣互为往返（同群组、方向相反）。
    pub fn is_reciprocal_of(&self, other: &Interest) -> bool {
        self.group_id == other.group_id
            && self.from_user_id == other.to_user_id
            && self.to_user_id == other.from_user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn self_interest_is_rejected() {
        let user = UserId::new(Uuid::new_v4());
        let group = GroupId::new(Uuid::new_v4());
        assert!(Interest::new(user, user, group, Utc::now()).is_err());
    }

    #[test]
    fn reciprocal_detection() {
        let a = UserId::new(Uuid::new_v4());
        let b = UserId::new(Uuid::new_v4());
        let group = GroupId::new(Uuid::new_v4());
        let other_group = GroupId::new(Uuid::new_v4());
        let now = Utc::now();

        let ab = Interest::new(a, b, group, now).unwrap();
        let ba = Interest::new(b, a, group, now).unwrap();
        let ba_elsewhere = Interest::new(b, a, other_group, now).unwrap();

        assert!(ab.is_reciprocal_of(&ba));
        assert!(ba.is_reciprocal_of(&ab));
        // 互选必须发生在同一个群组内
        assert!(!ab.is_reciprocal_of(&ba_elsewhere));
        assert!(!ab.is_reciprocal_of(&ab));
    }
}
