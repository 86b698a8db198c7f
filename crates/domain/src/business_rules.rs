//! 业务规则验证
//!
//! 点赞经济与匹配状态机的纯规则，供应用层在写入前调用。

use crate::entities::Group;
use crate::errors::{DomainError, DomainResult};
use crate::value_objects::Timestamp;

/// 非会员一次点赞的额度消耗
pub const LIKE_COST: i32 = 1;

/// 点赞额度规则
pub struct CreditRules;

impl CreditRules {
    /// 会员不受额度限制。
    pub fn can_like(balance: i32, is_premium: bool) -> bool {
        is_premium || balance >= LIKE_COST
    }

    pub fn like_cost(is_premium: bool) -> i32 {
        if is_premium {
            0
        } else {
            LIKE_COST
        }
    }
}

/// 群组开放性规则
pub struct GroupRules;

impl GroupRules {
    /// 过期或停用的群组关闭处理：不记录兴趣、不扣额度。
    pub fn ensure_open(group: &Group, now: Timestamp) -> DomainResult<()> {
        if group.is_open_at(now) {
            Ok(())
        } else {
            Err(DomainError::GroupNotActive { group_id: group.id })
        }
    }
}

/// (无序对, 群组) 维度的兴趣状态机。
///
/// `None -> {LoInterested | HiInterested} -> Matched`，Matched 为终态，
/// 之后的兴趣表达都是空操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairInterestState {
    None,
    /// 仅对中较小 ID 的一方表达了兴趣
    LoInterested,
    /// 仅对中较大 ID 的一方表达了兴趣
    HiInterested,
    Matched,
}

impl PairInterestState {
    pub fn derive(lo_likes_hi: bool, hi_likes_lo: bool) -> Self {
        match (lo_likes_hi, hi_likes_lo) {
            (false, false) => Self::None,
            (true, false) => Self::LoInterested,
            (false, true) => Self::HiInterested,
            (true, true) => Self::Matched,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::GroupType;
    use crate::value_objects::GroupId;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    #[test]
    fn premium_always_can_like() {
        assert!(CreditRules::can_like(0, true));
        assert_eq!(CreditRules::like_cost(true), 0);
    }

    #[test]
    fn non_premium_needs_balance() {
        assert!(!CreditRules::can_like(0, false));
        assert!(CreditRules::can_like(1, false));
        assert_eq!(CreditRules::like_cost(false), 1);
    }

    #[test]
    fn expired_group_fails_closed() {
        let now = Utc::now();
        let group = Group::new(
            GroupId::new(Uuid::new_v4()),
            "지난 이벤트",
            GroupType::Instance,
            Some(now - Duration::hours(1)),
            now - Duration::hours(2),
        );

        let err = GroupRules::ensure_open(&group, now).unwrap_err();
        assert!(matches!(err, DomainError::GroupNotActive { .. }));
    }

    #[test]
    fn state_machine_transitions() {
        assert_eq!(
            PairInterestState::derive(false, false),
            PairInterestState::None
        );
        assert_eq!(
            PairInterestState::derive(true, false),
            PairInterestState::LoInterested
        );
        assert_eq!(
            PairInterestState::derive(false, true),
            PairInterestState::HiInterested
        );
        assert_eq!(
            PairInterestState::derive(true, true),
            PairInterestState::Matched
        );
        assert!(PairInterestState::derive(true, true).is_terminal());
    }
}
