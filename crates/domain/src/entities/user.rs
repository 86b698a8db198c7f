//! 用户实体
//!
//! 用户以匿名 ID 活动，昵称只在匹配成立后对对方可见。
//! 点赞额度与会员状态由外部的支付/管理动作变更。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{Nickname, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub nickname: Nickname,
    /// 剩余点赞额度，永不为负
    pub credits: i32,
    pub is_premium: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn register(id: UserId, nickname: Nickname, now: Timestamp) -> Self {
        Self {
            id,
            nickname,
            credits: 0,
            is_premium: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// 充值入口（支付回调）。
    pub fn grant_credits(&mut self, amount: i32, now: Timestamp) -> DomainResult<()> {
        if amount <= 0 {
            return Err(DomainError::invalid_argument(
                "amount",
                "must be positive",
            ));
        }
        self.credits += amount;
        self.updated_at = now;
        Ok(())
    }

    /// 扣减额度，余额不足时拒绝且不做任何改动。
    pub fn debit(&mut self, cost: i32, now: Timestamp) -> DomainResult<()> {
        if cost == 0 {
            return Ok(());
        }
        if self.credits < cost {
            return Err(DomainError::InsufficientCredits {
                required: cost,
                balance: self.credits,
            });
        }
        self.credits -= cost;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_premium(&mut self, is_premium: bool, now: Timestamp) {
        self.is_premium = is_premium;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn test_user(credits: i32) -> User {
        let mut user = User::register(
            UserId::new(Uuid::new_v4()),
            Nickname::parse("은하수").unwrap(),
            Utc::now(),
        );
        user.credits = credits;
        user
    }

    #[test]
    fn debit_rejects_insufficient_balance_without_mutation() {
        let mut user = test_user(0);
        let err = user.debit(1, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientCredits { .. }));
        assert_eq!(user.credits, 0);
    }

    #[test]
    fn debit_of_zero_is_free() {
        let mut user = test_user(0);
        assert!(user.debit(0, Utc::now()).is_ok());
        assert_eq!(user.credits, 0);
    }

    #[test]
    fn debit_decrements_exactly_once() {
        let mut user = test_user(3);
        user.debit(1, Utc::now()).unwrap();
        assert_eq!(user.credits, 2);
    }

    #[test]
    fn grant_rejects_non_positive_amount() {
        let mut user = test_user(0);
        assert!(user.grant_credits(0, Utc::now()).is_err());
        assert!(user.grant_credits(-5, Utc::now()).is_err());
    }
}
