//! 消息同步层
//!
//! 每个房间一条按 (created_at, id) 排序、按消息 ID 去重的只追加时间线。
//! 实时投递、乐观本地追加、重连回填共用同一个 `ingest` 原语：
//! 先判重、再插入、再按时间重排，所以到达顺序无论怎么乱，
//! 最终呈现顺序只取决于创建时间，也不会出现丢失或重复。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use domain::moderation::ValidationContext;
use domain::{Message, MessageContent, MessageId, MessageType, RoomId, UserId};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::moderation::ModerationGate;
use crate::repository::{MessageCursor, MessageRepository};
use crate::transport::MessageTransport;

/// 房间时间线：id 索引 + 时间排序的消息日志。
#[derive(Debug, Default)]
pub struct RoomTimeline {
    entries: Vec<Message>,
    seen: HashSet<MessageId>,
}

impl RoomTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// 不存在则插入并按 (created_at, id) 重排；已存在是空操作。
    pub fn ingest(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id) {
            return false;
        }
        self.entries.push(message);
        self.entries
            .sort_by_key(|m| (m.created_at, Uuid::from(m.id)));
        true
    }

    /// 已读翻转，幂等且单调。
    pub fn mark_read(&mut self, id: MessageId, reader: UserId) -> bool {
        self.entries
            .iter_mut()
            .find(|m| m.id == id)
            .is_some_and(|m| m.mark_read_by(reader))
    }

    pub fn messages(&self) -> &[Message] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.seen.contains(&id)
    }
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub content: String,
    pub message_type: MessageType,
}

/// 发送结果。传输故障不算失败：消息已持久化并本地可见，
/// 进入待重放队列等重连。
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Delivered(Message),
    Queued(Message),
}

impl SendOutcome {
    pub fn message(&self) -> &Message {
        match self {
            Self::Delivered(message) | Self::Queued(message) => message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncSummary {
    /// 重放成功的待发消息数
    pub replayed: usize,
    /// 回填合并进时间线的消息数
    pub backfilled: usize,
}

pub struct ChatSyncServiceDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub transport: Arc<dyn MessageTransport>,
    pub moderation: Arc<ModerationGate>,
    pub clock: Arc<dyn Clock>,
}

pub struct ChatSyncService {
    deps: ChatSyncServiceDependencies,
    timelines: RwLock<HashMap<RoomId, RoomTimeline>>,
    outbox: Mutex<VecDeque<Message>>,
    backfills: StdMutex<HashMap<RoomId, JoinHandle<()>>>,
    backfill_page_size: i64,
}

impl ChatSyncService {
    pub fn new(deps: ChatSyncServiceDependencies, backfill_page_size: i64) -> Self {
        Self {
            deps,
            timelines: RwLock::new(HashMap::new()),
            outbox: Mutex::new(VecDeque::new()),
            backfills: StdMutex::new(HashMap::new()),
            backfill_page_size: backfill_page_size.max(1),
        }
    }

    /// 实时投递与回声的入口。重复 ID 返回 `false`。
    pub async fn ingest_incoming(&self, message: Message) -> bool {
        let mut timelines = self.timelines.write().await;
        timelines
            .entry(message.room_id)
            .or_default()
            .ingest(message)
    }

    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<SendOutcome, ApplicationError> {
        // HIGH 在这里中止；MEDIUM 拿到脱敏文本继续
        let filtered = self.deps.moderation.check(
            request.sender_id,
            &request.content,
            ValidationContext::Chat,
        )?;
        let content = MessageContent::new(filtered.text)?;

        let message = Message::new(
            MessageId::new(Uuid::new_v4()),
            request.room_id,
            request.sender_id,
            content,
            request.message_type,
            self.deps.clock.now(),
        );

        self.deps.message_repository.save(&message).await?;

        let outcome = match self.deps.transport.publish_message(&message).await {
            Ok(()) => SendOutcome::Delivered(message.clone()),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    message_id = %message.id,
                    "传输不可用，消息进入待重放队列"
                );
                self.outbox.lock().await.push_back(message.clone());
                SendOutcome::Queued(message.clone())
            }
        };

        // 乐观本地追加走同一条 ingest 路径，之后的服务端回声被去重吸收
        self.ingest_incoming(message).await;

        Ok(outcome)
    }

    /// 本端已读标记：本地翻转、持久化、回执外发。重复标记直接返回。
    pub async fn mark_read(
        &self,
        room_id: RoomId,
        message_id: MessageId,
        reader: UserId,
    ) -> Result<bool, ApplicationError> {
        let changed = {
            let mut timelines = self.timelines.write().await;
            timelines
                .get_mut(&room_id)
                .is_some_and(|timeline| timeline.mark_read(message_id, reader))
        };
        if !changed {
            return Ok(false);
        }

        self.deps
            .message_repository
            .mark_read(message_id, room_id, reader)
            .await?;

        // 回执是尽力而为：发不出去不回滚本地状态
        if let Err(err) = self
            .deps
            .transport
            .publish_read(room_id, message_id, reader)
            .await
        {
            tracing::warn!(error = %err, message_id = %message_id, "已读回执发送失败");
        }
        Ok(true)
    }

    /// 对端已读回执的入口，只更新本地时间线。
    pub async fn apply_read_receipt(
        &self,
        room_id: RoomId,
        message_id: MessageId,
        reader: UserId,
    ) -> bool {
        let mut timelines = self.timelines.write().await;
        timelines
            .get_mut(&room_id)
            .is_some_and(|timeline| timeline.mark_read(message_id, reader))
    }

    /// 分页回填历史并合并进时间线。
    ///
    /// 与实时投递共用 `ingest`，断线期间收到的消息不会被覆盖，
    /// 回填到的重复消息不会二次出现。返回实际合并的条数。
    pub async fn backfill(&self, room_id: RoomId) -> Result<usize, ApplicationError> {
        let mut merged = 0usize;
        let mut before: Option<MessageCursor> = None;

        loop {
            let page = self
                .deps
                .message_repository
                .recent(room_id, self.backfill_page_size, before)
                .await?;
            if page.is_empty() {
                break;
            }
            let page_len = page.len() as i64;
            // recent 按时间倒序返回，页尾是最老的一条
            before = page.last().map(MessageCursor::from_message);

            for message in page {
                if self.ingest_incoming(message).await {
                    merged += 1;
                }
            }

            if page_len < self.backfill_page_size {
                break;
            }
        }

        Ok(merged)
    }

    /// 重连入口：先重放待发队列，再回填历史。
    pub async fn resync(&self, room_id: RoomId) -> Result<ResyncSummary, ApplicationError> {
        let replayed = self.flush_outbox().await;
        let backfilled = self.backfill(room_id).await?;
        Ok(ResyncSummary {
            replayed,
            backfilled,
        })
    }

    /// 重放待发队列。传输再次失败时剩余消息原地保留。
    pub async fn flush_outbox(&self) -> usize {
        let mut outbox = self.outbox.lock().await;
        let mut replayed = 0usize;

        while let Some(message) = outbox.front().cloned() {
            match self.deps.transport.publish_message(&message).await {
                Ok(()) => {
                    outbox.pop_front();
                    replayed += 1;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "待重放队列发送仍然失败，保留剩余消息");
                    break;
                }
            }
        }
        replayed
    }

    pub async fn pending_count(&self) -> usize {
        self.outbox.lock().await.len()
    }

    /// 后台回填，句柄登记在房间名下以便离开时取消。
    pub fn start_backfill(self: Arc<Self>, room_id: RoomId) {
        let service = Arc::clone(&self);
        let mut guard = self
            .backfills
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // 同一房间重复触发时先取消旧任务
        if let Some(old) = guard.remove(&room_id) {
            old.abort();
        }
        guard.insert(
            room_id,
            tokio::spawn(async move {
                if let Err(err) = service.backfill(room_id).await {
                    tracing::warn!(error = %err, room_id = %room_id, "后台回填失败");
                }
            }),
        );
    }

    /// 离开房间：取消该房间的回填任务并丢弃时间线，重进从头订阅。
    pub async fn leave_room(&self, room_id: RoomId) {
        let handle = {
            let mut guard = self
                .backfills
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard.remove(&room_id)
        };
        if let Some(handle) = handle {
            handle.abort();
        }
        self.timelines.write().await.remove(&room_id);
    }

    /// 当前时间线快照，已按创建时间排序。
    pub async fn room_messages(&self, room_id: RoomId) -> Vec<Message> {
        let timelines = self.timelines.read().await;
        timelines
            .get(&room_id)
            .map(|timeline| timeline.messages().to_vec())
            .unwrap_or_default()
    }
}
