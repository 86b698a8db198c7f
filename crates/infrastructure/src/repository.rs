//! 存储接口的 PostgreSQL 实现
//!
//! 扣费+兴趣、匹配+房间这类跨记录写入都在单个事务内完成；
//! 唯一性靠表上的约束（interests 主键、matches/rooms 的
//! (user_lo, user_hi, group_id) 唯一索引），重复写入用
//! `ON CONFLICT DO NOTHING` 归一化为成功分支。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Group, GroupId, GroupType, Interest, Match, Message, MessageContent, MessageId,
    MessageType, Nickname, PairKey, RepositoryError, Room, RoomId, Timestamp, User, UserId,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use application::repository::{
    GroupRepository, InterestRepository, InterestWrite, MatchRepository, MatchWrite,
    MessageCursor, MessageRepository, UserRepository,
};

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    nickname: String,
    credits: i32,
    is_premium: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let nickname =
            Nickname::parse(value.nickname).map_err(|err| invalid_data(err.to_string()))?;
        Ok(User {
            id: UserId::from(value.id),
            nickname,
            credits: value.credits,
            is_premium: value.is_premium,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct GroupRecord {
    id: Uuid,
    name: String,
    group_type: String,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

fn parse_group_type(value: &str) -> Result<GroupType, RepositoryError> {
    match value {
        "official" => Ok(GroupType::Official),
        "created" => Ok(GroupType::Created),
        "instance" => Ok(GroupType::Instance),
        "location" => Ok(GroupType::Location),
        other => Err(invalid_data(format!("unknown group type: {other}"))),
    }
}

impl TryFrom<GroupRecord> for Group {
    type Error = RepositoryError;

    fn try_from(value: GroupRecord) -> Result<Self, Self::Error> {
        Ok(Group {
            id: GroupId::from(value.id),
            name: value.name,
            group_type: parse_group_type(&value.group_type)?,
            expires_at: value.expires_at,
            is_active: value.is_active,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MatchRecord {
    user_lo: Uuid,
    user_hi: Uuid,
    group_id: Uuid,
    room_id: Uuid,
    matched_at: DateTime<Utc>,
}

impl TryFrom<MatchRecord> for Match {
    type Error = RepositoryError;

    fn try_from(value: MatchRecord) -> Result<Self, Self::Error> {
        let pair = PairKey::new(UserId::from(value.user_lo), UserId::from(value.user_hi))
            .map_err(|err| invalid_data(err.to_string()))?;
        Ok(Match {
            pair,
            group_id: GroupId::from(value.group_id),
            room_id: RoomId::from(value.room_id),
            matched_at: value.matched_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    room_id: Uuid,
    sender_id: Uuid,
    content: String,
    message_type: String,
    media: Option<String>,
    is_read: bool,
    read_by: Vec<Uuid>,
    created_at: DateTime<Utc>,
}

fn message_type_columns(message_type: &MessageType) -> (&'static str, Option<String>) {
    match message_type {
        MessageType::Text => ("text", None),
        MessageType::Image { url } => ("image", Some(url.clone())),
        MessageType::Emoji { shortcode } => ("emoji", Some(shortcode.clone())),
    }
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let message_type = match value.message_type.as_str() {
            "text" => MessageType::Text,
            "image" => MessageType::Image {
                url: value.media.clone().unwrap_or_default(),
            },
            "emoji" => MessageType::Emoji {
                shortcode: value.media.clone().unwrap_or_default(),
            },
            other => return Err(invalid_data(format!("unknown message type: {other}"))),
        };
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Message {
            id: MessageId::from(value.id),
            room_id: RoomId::from(value.room_id),
            sender_id: UserId::from(value.sender_id),
            content,
            message_type,
            created_at: value.created_at,
            is_read: value.is_read,
            read_by: value.read_by.into_iter().map(UserId::from).collect(),
        })
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: Arc<PgPool>,
}

impl PgUserRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, nickname, credits, is_premium, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, nickname, credits, is_premium, created_at, updated_at
            "#,
        )
        .bind(Uuid::from(user.id))
        .bind(user.nickname.as_str())
        .bind(user.credits)
        .bind(user.is_premium)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(map_sqlx_err)?;

        User::try_from(record)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, nickname, credits, is_premium, created_at, updated_at
            FROM users WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }
}

#[derive(Clone)]
pub struct PgGroupRepository {
    pool: Arc<PgPool>,
}

impl PgGroupRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupRepository for PgGroupRepository {
    async fn create(&self, group: Group) -> Result<Group, RepositoryError> {
        let record = sqlx::query_as::<_, GroupRecord>(
            r#"
            INSERT INTO groups (id, name, group_type, expires_at, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, group_type, expires_at, is_active, created_at
            "#,
        )
        .bind(Uuid::from(group.id))
        .bind(group.name.clone())
        .bind(group.group_type.as_str())
        .bind(group.expires_at)
        .bind(group.is_active)
        .bind(group.created_at)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(map_sqlx_err)?;

        Group::try_from(record)
    }

    async fn find_by_id(&self, id: GroupId) -> Result<Option<Group>, RepositoryError> {
        let record = sqlx::query_as::<_, GroupRecord>(
            r#"
            SELECT id, name, group_type, expires_at, is_active, created_at
            FROM groups WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(map_sqlx_err)?;

        record.map(Group::try_from).transpose()
    }
}

#[derive(Clone)]
pub struct PgInterestRepository {
    pool: Arc<PgPool>,
}

impl PgInterestRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InterestRepository for PgInterestRepository {
    async fn record(
        &self,
        interest: Interest,
        cost: i32,
    ) -> Result<InterestWrite, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        // 1. 幂等写入：主键冲突说明同方向兴趣已存在
        let inserted = sqlx::query(
            r#"
            INSERT INTO interests (from_user_id, to_user_id, group_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (from_user_id, to_user_id, group_id) DO NOTHING
            "#,
        )
        .bind(Uuid::from(interest.from_user_id))
        .bind(Uuid::from(interest.to_user_id))
        .bind(Uuid::from(interest.group_id))
        .bind(interest.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?
        .rows_affected();

        if inserted == 0 {
            // 重复表达：不扣费，幂等成功
            tx.commit().await.map_err(map_sqlx_err)?;
            return Ok(InterestWrite::Duplicate);
        }

        // 2. 同一事务内扣费，余额不足回滚整笔写入
        if cost > 0 {
            let debited = sqlx::query(
                r#"
                UPDATE users
                SET credits = credits - $2, updated_at = $3
                WHERE id = $1 AND credits >= $2
                "#,
            )
            .bind(Uuid::from(interest.from_user_id))
            .bind(cost)
            .bind(interest.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?
            .rows_affected();

            if debited == 0 {
                tx.rollback().await.map_err(map_sqlx_err)?;
                return Ok(InterestWrite::InsufficientCredits);
            }
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(InterestWrite::Inserted)
    }

    async fn exists(
        &self,
        from: UserId,
        to: UserId,
        group_id: GroupId,
    ) -> Result<bool, RepositoryError> {
        let found: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM interests
            WHERE from_user_id = $1 AND to_user_id = $2 AND group_id = $3
            "#,
        )
        .bind(Uuid::from(from))
        .bind(Uuid::from(to))
        .bind(Uuid::from(group_id))
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(map_sqlx_err)?;

        Ok(found.is_some())
    }

    async fn received_count(
        &self,
        to: UserId,
        group_id: GroupId,
    ) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM interests
            WHERE to_user_id = $1 AND group_id = $2
            "#,
        )
        .bind(Uuid::from(to))
        .bind(Uuid::from(group_id))
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(map_sqlx_err)?;

        Ok(count)
    }
}

#[derive(Clone)]
pub struct PgMatchRepository {
    pool: Arc<PgPool>,
}

impl PgMatchRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatchRepository for PgMatchRepository {
    async fn create_with_room(
        &self,
        candidate: Match,
        room: Room,
    ) -> Result<MatchWrite, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        // 1. 房间 get-or-create：同对同群组的房间恰好一个
        let room_id: Uuid = {
            let created: Option<(Uuid,)> = sqlx::query_as(
                r#"
                INSERT INTO rooms (id, user_lo, user_hi, group_id, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (user_lo, user_hi, group_id) DO NOTHING
                RETURNING id
                "#,
            )
            .bind(Uuid::from(room.id))
            .bind(Uuid::from(room.pair.lo()))
            .bind(Uuid::from(room.pair.hi()))
            .bind(Uuid::from(room.group_id))
            .bind(room.created_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

            match created {
                Some((id,)) => id,
                None => {
                    let (id,): (Uuid,) = sqlx::query_as(
                        r#"
                        SELECT id FROM rooms
                        WHERE user_lo = $1 AND user_hi = $2 AND group_id = $3
                        "#,
                    )
                    .bind(Uuid::from(room.pair.lo()))
                    .bind(Uuid::from(room.pair.hi()))
                    .bind(Uuid::from(room.group_id))
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_sqlx_err)?;
                    id
                }
            }
        };

        // 2. 匹配写入：唯一约束命中说明并发的互选点赞已经赢了
        let created = sqlx::query_as::<_, MatchRecord>(
            r#"
            INSERT INTO matches (user_lo, user_hi, group_id, room_id, matched_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_lo, user_hi, group_id) DO NOTHING
            RETURNING user_lo, user_hi, group_id, room_id, matched_at
            "#,
        )
        .bind(Uuid::from(candidate.pair.lo()))
        .bind(Uuid::from(candidate.pair.hi()))
        .bind(Uuid::from(candidate.group_id))
        .bind(room_id)
        .bind(candidate.matched_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;

        match created {
            Some(record) => Ok(MatchWrite::Created(Match::try_from(record)?)),
            None => {
                // 输掉的一方把已有记录当成功拿回去，不报错、不重试
                let existing = self
                    .find_by_pair(candidate.pair, candidate.group_id)
                    .await?
                    .ok_or(RepositoryError::NotFound)?;
                Ok(MatchWrite::Existing(existing))
            }
        }
    }

    async fn find_by_pair(
        &self,
        pair: PairKey,
        group_id: GroupId,
    ) -> Result<Option<Match>, RepositoryError> {
        let record = sqlx::query_as::<_, MatchRecord>(
            r#"
            SELECT user_lo, user_hi, group_id, room_id, matched_at
            FROM matches
            WHERE user_lo = $1 AND user_hi = $2 AND group_id = $3
            "#,
        )
        .bind(Uuid::from(pair.lo()))
        .bind(Uuid::from(pair.hi()))
        .bind(Uuid::from(group_id))
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(map_sqlx_err)?;

        record.map(Match::try_from).transpose()
    }

    async fn find_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Match>, RepositoryError> {
        let pair = PairKey::new(a, b).map_err(|err| invalid_data(err.to_string()))?;
        let record = sqlx::query_as::<_, MatchRecord>(
            r#"
            SELECT user_lo, user_hi, group_id, room_id, matched_at
            FROM matches
            WHERE user_lo = $1 AND user_hi = $2
            ORDER BY matched_at ASC
            LIMIT 1
            "#,
        )
        .bind(Uuid::from(pair.lo()))
        .bind(Uuid::from(pair.hi()))
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(map_sqlx_err)?;

        record.map(Match::try_from).transpose()
    }

    async fn find_by_room(&self, room_id: RoomId) -> Result<Option<Match>, RepositoryError> {
        let record = sqlx::query_as::<_, MatchRecord>(
            r#"
            SELECT user_lo, user_hi, group_id, room_id, matched_at
            FROM matches
            WHERE room_id = $1
            "#,
        )
        .bind(Uuid::from(room_id))
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(map_sqlx_err)?;

        record.map(Match::try_from).transpose()
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: Arc<PgPool>,
}

impl PgMessageRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn save(&self, message: &Message) -> Result<(), RepositoryError> {
        let (type_name, media) = message_type_columns(&message.message_type);
        let read_by: Vec<Uuid> = message.read_by.iter().map(|id| Uuid::from(*id)).collect();

        // 按消息 ID 幂等：传输重试导致的重复保存是空操作
        sqlx::query(
            r#"
            INSERT INTO messages
                (id, room_id, sender_id, content, message_type, media, is_read, read_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.room_id))
        .bind(Uuid::from(message.sender_id))
        .bind(message.content.as_str())
        .bind(type_name)
        .bind(media)
        .bind(message.is_read)
        .bind(read_by)
        .bind(message.created_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, room_id, sender_id, content, message_type, media, is_read, read_by, created_at
            FROM messages WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }

    async fn recent(
        &self,
        room_id: RoomId,
        limit: i64,
        before: Option<MessageCursor>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let (cursor_at, cursor_id): (Option<Timestamp>, Option<Uuid>) = match before {
            Some(cursor) => (Some(cursor.created_at), Some(Uuid::from(cursor.id))),
            None => (None, None),
        };

        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, room_id, sender_id, content, message_type, media, is_read, read_by, created_at
            FROM messages
            WHERE room_id = $1
              AND ($2::timestamptz IS NULL OR (created_at, id) < ($2, $3))
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(cursor_at)
        .bind(cursor_id)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }

    async fn mark_read(
        &self,
        id: MessageId,
        room_id: RoomId,
        reader: UserId,
    ) -> Result<(), RepositoryError> {
        // 幂等且单调：已在 read_by 里的读者不再追加，已读不回退
        sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE,
                read_by = CASE
                    WHEN $3 = ANY(read_by) THEN read_by
                    ELSE array_append(read_by, $3)
                END
            WHERE id = $1 AND room_id = $2
            "#,
        )
        .bind(Uuid::from(id))
        .bind(Uuid::from(room_id))
        .bind(Uuid::from(reader))
        .execute(self.pool.as_ref())
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }
}
