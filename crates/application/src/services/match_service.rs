//! 匹配引擎
//!
//! 点赞动作的完整链路：审核门 -> 群组开放性 -> 额度门 -> 幂等兴趣
//! 写入 -> 互选检测 -> 匹配与房间创建 -> 双方通知。
//!
//! 互选检测到匹配创建之间存在并发窗口：两个用户可能同时完成对方
//! 方向的点赞。这里不做先读后写，唯一性交给存储层的
//! (user_lo, user_hi, group_id) 约束，输掉的一方拿回已有匹配记录。

use std::sync::Arc;

use domain::moderation::ValidationContext;
use domain::{
    CreditRules, DomainError, GroupId, GroupRules, Interest, Match, Nickname,
    PairInterestState, PairKey, RepositoryError, Room, RoomId, Timestamp, UserId,
};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::moderation::ModerationGate;
use crate::notifier::MatchNotifier;
use crate::repository::{
    GroupRepository, InterestRepository, InterestWrite, MatchRepository, MatchWrite,
    UserRepository,
};

#[derive(Debug, Clone)]
pub struct ExpressInterestRequest {
    pub from: UserId,
    pub to: UserId,
    pub group_id: GroupId,
    /// 点赞附言，可选；出现时先过审核门
    pub note: Option<String>,
}

/// 点赞动作的结果。重复与已匹配都是成功语义。
#[derive(Debug, Clone, PartialEq)]
pub enum InterestOutcome {
    /// 单向兴趣已记录，等待对方
    Recorded,
    /// 同一方向的兴趣已存在；幂等成功，未重复扣费
    AlreadyInterested,
    /// 本次点赞促成了匹配
    Matched(Match),
    /// 匹配早已存在（终态，后续表达都是空操作）
    AlreadyMatched(Match),
}

pub struct MatchServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub group_repository: Arc<dyn GroupRepository>,
    pub interest_repository: Arc<dyn InterestRepository>,
    pub match_repository: Arc<dyn MatchRepository>,
    pub moderation: Arc<ModerationGate>,
    pub notifier: Arc<dyn MatchNotifier>,
    pub clock: Arc<dyn Clock>,
}

pub struct MatchService {
    deps: MatchServiceDependencies,
}

impl MatchService {
    pub fn new(deps: MatchServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn express_interest(
        &self,
        request: ExpressInterestRequest,
    ) -> Result<InterestOutcome, ApplicationError> {
        let pair = PairKey::new(request.from, request.to)?;
        let now = self.deps.clock.now();

        // 群组不存在与不开放同样关闭处理
        let group = self
            .deps
            .group_repository
            .find_by_id(request.group_id)
            .await?
            .ok_or(DomainError::GroupNotActive {
                group_id: request.group_id,
            })?;
        GroupRules::ensure_open(&group, now)?;

        // 审核在一切写入之前，HIGH 中止且无任何副作用
        if let Some(note) = &request.note {
            self.deps
                .moderation
                .check(request.from, note, ValidationContext::Chat)?;
        }

        // 终态短路：已匹配的对不再扣费也不再写入
        if let Some(existing) = self
            .deps
            .match_repository
            .find_by_pair(pair, group.id)
            .await?
        {
            return Ok(InterestOutcome::AlreadyMatched(existing));
        }

        let liker = self
            .deps
            .user_repository
            .find_by_id(request.from)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let cost = CreditRules::like_cost(liker.is_premium);
        if !CreditRules::can_like(liker.credits, liker.is_premium) {
            return Err(DomainError::InsufficientCredits {
                required: cost,
                balance: liker.credits,
            }
            .into());
        }

        let interest = Interest::new(request.from, request.to, group.id, now)?;
        let write = self.deps.interest_repository.record(interest, cost).await?;

        match write {
            // 事务内的余额再校验兜住并发扣费的竞态
            InterestWrite::InsufficientCredits => Err(DomainError::InsufficientCredits {
                required: cost,
                balance: liker.credits,
            }
            .into()),
            InterestWrite::Duplicate => {
                // 幂等重放；若对方在此期间完成了互选，这里补齐匹配
                match self.try_complete_match(pair, group.id, &request, now).await? {
                    Some(MatchWrite::Created(matched)) => {
                        self.notify_match_created(&matched);
                        Ok(InterestOutcome::Matched(matched))
                    }
                    Some(MatchWrite::Existing(matched)) => {
                        Ok(InterestOutcome::AlreadyMatched(matched))
                    }
                    None => Ok(InterestOutcome::AlreadyInterested),
                }
            }
            InterestWrite::Inserted => {
                match self.try_complete_match(pair, group.id, &request, now).await? {
                    Some(MatchWrite::Created(matched)) => {
                        self.notify_match_created(&matched);
                        Ok(InterestOutcome::Matched(matched))
                    }
                    Some(MatchWrite::Existing(matched)) => {
                        Ok(InterestOutcome::AlreadyMatched(matched))
                    }
                    None => {
                        // 单向兴趣：对方只收到匿名的聚合信号
                        self.notify_liked(request.to, group.id);
                        Ok(InterestOutcome::Recorded)
                    }
                }
            }
        }
    }

    /// 互选成立时获取或创建匹配与房间；未互选返回 `None`。
    async fn try_complete_match(
        &self,
        pair: PairKey,
        group_id: GroupId,
        request: &ExpressInterestRequest,
        now: Timestamp,
    ) -> Result<Option<MatchWrite>, ApplicationError> {
        let reciprocal = self
            .deps
            .interest_repository
            .exists(request.to, request.from, group_id)
            .await?;
        if !reciprocal {
            return Ok(None);
        }

        let room = Room::new(RoomId::new(Uuid::new_v4()), pair, group_id, now);
        let candidate = Match::new(pair, group_id, room.id, now);
        let write = self
            .deps
            .match_repository
            .create_with_room(candidate, room)
            .await?;
        Ok(Some(write))
    }

    /// 匹配前唯一允许的跨用户信号：收到的兴趣总数。
    pub async fn liked_by_count(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<i64, ApplicationError> {
        Ok(self
            .deps
            .interest_repository
            .received_count(user_id, group_id)
            .await?)
    }

    /// 当前 (无序对, 群组) 的状态机位置。
    pub async fn pair_state(
        &self,
        a: UserId,
        b: UserId,
        group_id: GroupId,
    ) -> Result<PairInterestState, ApplicationError> {
        let pair = PairKey::new(a, b)?;
        if self
            .deps
            .match_repository
            .find_by_pair(pair, group_id)
            .await?
            .is_some()
        {
            return Ok(PairInterestState::Matched);
        }
        let lo_likes_hi = self
            .deps
            .interest_repository
            .exists(pair.lo(), pair.hi(), group_id)
            .await?;
        let hi_likes_lo = self
            .deps
            .interest_repository
            .exists(pair.hi(), pair.lo(), group_id)
            .await?;
        Ok(PairInterestState::derive(lo_likes_hi, hi_likes_lo))
    }

    /// 昵称解析。匹配成立前对方身份不可见，之后双向可见。
    pub async fn resolve_nickname(
        &self,
        viewer: UserId,
        target: UserId,
    ) -> Result<Nickname, ApplicationError> {
        if viewer != target {
            self.deps
                .match_repository
                .find_between(viewer, target)
                .await?
                .ok_or(DomainError::NotMatched)?;
        }
        let user = self
            .deps
            .user_repository
            .find_by_id(target)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        Ok(user.nickname)
    }

    fn notify_match_created(&self, matched: &Match) {
        for user_id in [matched.pair.lo(), matched.pair.hi()] {
            let notifier = Arc::clone(&self.deps.notifier);
            let matched = matched.clone();
            tokio::spawn(async move {
                if let Err(err) = notifier.notify_match(user_id, &matched).await {
                    tracing::warn!(error = %err, user_id = %user_id, "匹配通知发送失败");
                }
            });
        }
    }

    fn notify_liked(&self, user_id: UserId, group_id: GroupId) {
        let notifier = Arc::clone(&self.deps.notifier);
        tokio::spawn(async move {
            if let Err(err) = notifier.notify_liked(user_id, group_id).await {
                tracing::warn!(error = %err, user_id = %user_id, "点赞通知发送失败");
            }
        });
    }
}
