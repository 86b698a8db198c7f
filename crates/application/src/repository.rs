//! 存储接口
//!
//! 跨多条记录的不变量（扣费+兴趣、互选→匹配、房间恰好一次）全部
//! 由实现方用数据库事务与唯一约束保证，而不是先读后写。

use async_trait::async_trait;
use domain::{
    Group, GroupId, Interest, Match, Message, MessageId, PairKey, RepositoryError, Room, RoomId,
    Timestamp, User, UserId,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
}

#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn create(&self, group: Group) -> Result<Group, RepositoryError>;
    async fn find_by_id(&self, id: GroupId) -> Result<Option<Group>, RepositoryError>;
}

/// 兴趣写入的结果。重复与余额不足都是正常分支，不走错误通道。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestWrite {
    /// 新写入，扣费（如有）已在同一事务内完成
    Inserted,
    /// (from, to, group) 已存在；幂等成功，未扣费
    Duplicate,
    /// 事务内余额校验失败；未写入、未扣费
    InsufficientCredits,
}

#[async_trait]
pub trait InterestRepository: Send + Sync {
    /// 在单个事务内完成兴趣写入与额度扣减。
    ///
    /// 任何情况下都不会出现"扣了费没有兴趣"或"有兴趣没扣费"的
    /// 中间状态。
    async fn record(&self, interest: Interest, cost: i32) -> Result<InterestWrite, RepositoryError>;

    async fn exists(
        &self,
        from: UserId,
        to: UserId,
        group_id: GroupId,
    ) -> Result<bool, RepositoryError>;

    /// 收到的兴趣总数。匹配前唯一允许暴露的聚合信号。
    async fn received_count(&self, to: UserId, group_id: GroupId)
        -> Result<i64, RepositoryError>;
}

/// 匹配写入的结果。
#[derive(Debug, Clone, PartialEq)]
pub enum MatchWrite {
    Created(Match),
    /// 唯一约束命中：并发的互选点赞里输掉的一方拿到已有记录
    Existing(Match),
}

#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// 获取或创建匹配与房间，依赖 (user_lo, user_hi, group_id) 唯一约束。
    ///
    /// 两个互选点赞并发到达时只有一个 `Created`，另一个拿到
    /// `Existing`，不是错误，也不需要重试。
    async fn create_with_room(
        &self,
        candidate: Match,
        room: Room,
    ) -> Result<MatchWrite, RepositoryError>;

    async fn find_by_pair(
        &self,
        pair: PairKey,
        group_id: GroupId,
    ) -> Result<Option<Match>, RepositoryError>;

    /// 任意群组内两人之间的匹配，用于昵称解析的权限判定。
    async fn find_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Match>, RepositoryError>;

    /// 房间归属的匹配，消息推送按这里拿到的对端做定向。
    async fn find_by_room(&self, room_id: RoomId) -> Result<Option<Match>, RepositoryError>;
}

/// 向前翻页的复合游标。
///
/// 只用时间戳在同一时刻多条消息横跨页边界时会漏数据，
/// 所以带上消息 ID 做次级排序键。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageCursor {
    pub created_at: Timestamp,
    pub id: MessageId,
}

impl MessageCursor {
    pub fn from_message(message: &Message) -> Self {
        Self {
            created_at: message.created_at,
            id: message.id,
        }
    }
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 按消息 ID 幂等写入（重复保存是空操作）。
    async fn save(&self, message: &Message) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;

    /// 房间最近消息，按 (created_at, id) 倒序返回，`before` 为游标。
    async fn recent(
        &self,
        room_id: RoomId,
        limit: i64,
        before: Option<MessageCursor>,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// 已读标记，数据库侧同样幂等且单调。
    async fn mark_read(
        &self,
        id: MessageId,
        room_id: RoomId,
        reader: UserId,
    ) -> Result<(), RepositoryError>;
}
