//! 消息同步层单元测试
//!
//! 内存仓储加可控故障的传输桩，覆盖去重、乱序、乐观回声、
//! 断线重放与分页回填。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use domain::{
    DomainError, Message, MessageContent, MessageId, MessageType, RepositoryError, RoomId,
    Timestamp, UserId,
};
use uuid::Uuid;

use crate::clock::SystemClock;
use crate::error::ApplicationError;
use crate::moderation::{ModerationGate, ViolationRecord, ViolationSink};
use crate::repository::{MessageCursor, MessageRepository};
use crate::services::{ChatSyncService, ChatSyncServiceDependencies, SendMessageRequest, SendOutcome};
use crate::transport::{MessageTransport, TransportError};

#[derive(Default)]
struct InMemoryMessageRepo {
    messages: Mutex<HashMap<MessageId, Message>>,
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepo {
    async fn save(&self, message: &Message) -> Result<(), RepositoryError> {
        // 与 Postgres 实现一致：按 ID 幂等
        self.messages
            .lock()
            .unwrap()
            .entry(message.id)
            .or_insert_with(|| message.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        Ok(self.messages.lock().unwrap().get(&id).cloned())
    }

    async fn recent(
        &self,
        room_id: RoomId,
        limit: i64,
        before: Option<MessageCursor>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let mut page: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.room_id == room_id)
            .filter(|m| match before {
                Some(cursor) => {
                    (m.created_at, Uuid::from(m.id))
                        < (cursor.created_at, Uuid::from(cursor.id))
                }
                None => true,
            })
            .cloned()
            .collect();
        page.sort_by_key(|m| std::cmp::Reverse((m.created_at, Uuid::from(m.id))));
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn mark_read(
        &self,
        id: MessageId,
        _room_id: RoomId,
        reader: UserId,
    ) -> Result<(), RepositoryError> {
        let mut messages = self.messages.lock().unwrap();
        let message = messages.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        message.mark_read_by(reader);
        Ok(())
    }
}

#[derive(Default)]
struct TestTransport {
    offline: AtomicBool,
    published: Mutex<Vec<MessageId>>,
    read_receipts: Mutex<Vec<(RoomId, MessageId, UserId)>>,
}

impl TestTransport {
    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageTransport for TestTransport {
    async fn publish_message(&self, message: &Message) -> Result<(), TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::unavailable("socket closed"));
        }
        self.published.lock().unwrap().push(message.id);
        Ok(())
    }

    async fn publish_read(
        &self,
        room_id: RoomId,
        message_id: MessageId,
        reader: UserId,
    ) -> Result<(), TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::unavailable("socket closed"));
        }
        self.read_receipts
            .lock()
            .unwrap()
            .push((room_id, message_id, reader));
        Ok(())
    }
}

struct NoopSink;

#[async_trait]
impl ViolationSink for NoopSink {
    async fn record(&self, _violation: ViolationRecord) -> Result<(), RepositoryError> {
        Ok(())
    }
}

struct Harness {
    repo: Arc<InMemoryMessageRepo>,
    transport: Arc<TestTransport>,
    service: Arc<ChatSyncService>,
}

impl Harness {
    fn new(page_size: i64) -> Self {
        let repo = Arc::new(InMemoryMessageRepo::default());
        let transport = Arc::new(TestTransport::default());
        let clock = Arc::new(SystemClock);
        let moderation = Arc::new(ModerationGate::new(Arc::new(NoopSink), clock.clone()));

        let service = Arc::new(ChatSyncService::new(
            ChatSyncServiceDependencies {
                message_repository: repo.clone(),
                transport: transport.clone(),
                moderation,
                clock,
            },
            page_size,
        ));

        Self {
            repo,
            transport,
            service,
        }
    }
}

fn message_at(room_id: RoomId, base: Timestamp, offset_secs: i64) -> Message {
    Message::new(
        MessageId::new(Uuid::new_v4()),
        room_id,
        UserId::new(Uuid::new_v4()),
        MessageContent::new("테스트 메시지").unwrap(),
        MessageType::Text,
        base + Duration::seconds(offset_secs),
    )
}

#[tokio::test]
async fn repeated_ingest_keeps_single_copy() {
    let harness = Harness::new(50);
    let room_id = RoomId::new(Uuid::new_v4());
    let message = message_at(room_id, Utc::now(), 0);

    assert!(harness.service.ingest_incoming(message.clone()).await);
    for _ in 0..5 {
        assert!(!harness.service.ingest_incoming(message.clone()).await);
    }
    assert_eq!(harness.service.room_messages(room_id).await.len(), 1);
}

#[tokio::test]
async fn late_arrival_is_displayed_by_created_at() {
    let harness = Harness::new(50);
    let room_id = RoomId::new(Uuid::new_v4());
    let base = Utc::now();
    let m1 = message_at(room_id, base, 1);
    let m2 = message_at(room_id, base, 2);

    // m2 先到、m1 后到，呈现顺序仍按创建时间
    harness.service.ingest_incoming(m2.clone()).await;
    harness.service.ingest_incoming(m1.clone()).await;

    let visible: Vec<MessageId> = harness
        .service
        .room_messages(room_id)
        .await
        .iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(visible, vec![m1.id, m2.id]);
}

#[tokio::test]
async fn send_persists_publishes_and_absorbs_echo() {
    let harness = Harness::new(50);
    let room_id = RoomId::new(Uuid::new_v4());
    let sender = UserId::new(Uuid::new_v4());

    let outcome = harness
        .service
        .send_message(SendMessageRequest {
            room_id,
            sender_id: sender,
            content: "저녁에 시간 있어요?".to_string(),
            message_type: MessageType::Text,
        })
        .await
        .unwrap();

    let sent = match outcome {
        SendOutcome::Delivered(message) => message,
        other => panic!("expected Delivered, got {other:?}"),
    };

    assert!(harness.repo.messages.lock().unwrap().contains_key(&sent.id));
    assert_eq!(harness.transport.published.lock().unwrap().len(), 1);
    assert_eq!(harness.service.room_messages(room_id).await.len(), 1);

    // 服务端回声与乐观副本同 ID，被去重吸收而不是翻倍
    assert!(!harness.service.ingest_incoming(sent).await);
    assert_eq!(harness.service.room_messages(room_id).await.len(), 1);
}

#[tokio::test]
async fn send_rejects_high_severity_without_side_effects() {
    let harness = Harness::new(50);
    let room_id = RoomId::new(Uuid::new_v4());

    let err = harness
        .service
        .send_message(SendMessageRequest {
            room_id,
            sender_id: UserId::new(Uuid::new_v4()),
            content: "카지노 링크 줄게".to_string(),
            message_type: MessageType::Text,
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::ContentRejected { .. })
    ));
    assert!(harness.repo.messages.lock().unwrap().is_empty());
    assert!(harness.transport.published.lock().unwrap().is_empty());
    assert!(harness.service.room_messages(room_id).await.is_empty());
}

#[tokio::test]
async fn send_masks_medium_content_before_store() {
    let harness = Harness::new(50);
    let room_id = RoomId::new(Uuid::new_v4());

    let outcome = harness
        .service
        .send_message(SendMessageRequest {
            room_id,
            sender_id: UserId::new(Uuid::new_v4()),
            content: "내 번호 010-1234-5678 저장해줘".to_string(),
            message_type: MessageType::Text,
        })
        .await
        .unwrap();

    let stored = outcome.message().content.as_str().to_owned();
    assert!(!stored.contains("010-1234-5678"));
    assert!(stored.contains('*'));

    // 落库的也是脱敏后的文本
    let persisted = harness
        .repo
        .messages
        .lock()
        .unwrap()
        .values()
        .next()
        .unwrap()
        .content
        .as_str()
        .to_owned();
    assert_eq!(persisted, stored);
}

#[tokio::test]
async fn transport_failure_queues_then_resync_replays() {
    let harness = Harness::new(50);
    let room_id = RoomId::new(Uuid::new_v4());
    harness.transport.set_offline(true);

    let outcome = harness
        .service
        .send_message(SendMessageRequest {
            room_id,
            sender_id: UserId::new(Uuid::new_v4()),
            content: "이따 봐요".to_string(),
            message_type: MessageType::Text,
        })
        .await
        .unwrap();

    let queued = match outcome {
        SendOutcome::Queued(message) => message,
        other => panic!("expected Queued, got {other:?}"),
    };

    // 降级而非失败：本地已乐观可见，消息排队等待重连
    assert_eq!(harness.service.pending_count().await, 1);
    assert_eq!(harness.service.room_messages(room_id).await.len(), 1);
    assert!(harness.transport.published.lock().unwrap().is_empty());

    harness.transport.set_offline(false);
    let summary = harness.service.resync(room_id).await.unwrap();
    assert_eq!(summary.replayed, 1);
    assert_eq!(harness.service.pending_count().await, 0);
    assert_eq!(
        harness.transport.published.lock().unwrap().as_slice(),
        &[queued.id]
    );
}

#[tokio::test]
async fn backfill_merges_without_loss_or_duplication() {
    // 页大小 2，强制走多轮游标翻页
    let harness = Harness::new(2);
    let room_id = RoomId::new(Uuid::new_v4());
    let base = Utc::now();

    let history: Vec<Message> = (0..5).map(|i| message_at(room_id, base, i)).collect();
    for message in &history {
        harness.repo.save(message).await.unwrap();
    }

    // 断线期间实时收到了历史中的一条（回声）和一条全新消息
    harness.service.ingest_incoming(history[2].clone()).await;
    let live_only = message_at(room_id, base, 9);
    harness.service.ingest_incoming(live_only.clone()).await;

    let merged = harness.service.backfill(room_id).await.unwrap();
    assert_eq!(merged, 4, "already-present messages must not be re-merged");

    let visible = harness.service.room_messages(room_id).await;
    assert_eq!(visible.len(), 6);

    let mut expected: Vec<MessageId> = history.iter().map(|m| m.id).collect();
    expected.push(live_only.id);
    let visible_ids: Vec<MessageId> = visible.iter().map(|m| m.id).collect();
    assert_eq!(visible_ids, expected, "merged log stays time-ordered");
}

#[tokio::test]
async fn mark_read_is_idempotent_and_monotonic() {
    let harness = Harness::new(50);
    let room_id = RoomId::new(Uuid::new_v4());
    let reader = UserId::new(Uuid::new_v4());
    let message = message_at(room_id, Utc::now(), 0);

    harness.repo.save(&message).await.unwrap();
    harness.service.ingest_incoming(message.clone()).await;

    assert!(harness
        .service
        .mark_read(room_id, message.id, reader)
        .await
        .unwrap());
    // 重复标记：无变化、不再持久化、不再发回执
    assert!(!harness
        .service
        .mark_read(room_id, message.id, reader)
        .await
        .unwrap());

    assert_eq!(harness.transport.read_receipts.lock().unwrap().len(), 1);
    let persisted = harness.repo.find_by_id(message.id).await.unwrap().unwrap();
    assert!(persisted.is_read);
    assert_eq!(persisted.read_by, vec![reader]);
}

#[tokio::test]
async fn read_receipt_failure_keeps_local_state() {
    let harness = Harness::new(50);
    let room_id = RoomId::new(Uuid::new_v4());
    let reader = UserId::new(Uuid::new_v4());
    let message = message_at(room_id, Utc::now(), 0);

    harness.repo.save(&message).await.unwrap();
    harness.service.ingest_incoming(message.clone()).await;
    harness.transport.set_offline(true);

    // 回执发送失败不回滚已读状态
    assert!(harness
        .service
        .mark_read(room_id, message.id, reader)
        .await
        .unwrap());
    let visible = harness.service.room_messages(room_id).await;
    assert!(visible[0].is_read_by(reader));
}

#[tokio::test]
async fn apply_read_receipt_updates_local_timeline() {
    let harness = Harness::new(50);
    let room_id = RoomId::new(Uuid::new_v4());
    let reader = UserId::new(Uuid::new_v4());
    let message = message_at(room_id, Utc::now(), 0);

    harness.service.ingest_incoming(message.clone()).await;

    assert!(harness.service.apply_read_receipt(room_id, message.id, reader).await);
    assert!(!harness.service.apply_read_receipt(room_id, message.id, reader).await);
}

#[tokio::test]
async fn leave_room_drops_timeline_and_backfill() {
    let harness = Harness::new(2);
    let room_id = RoomId::new(Uuid::new_v4());
    let base = Utc::now();

    for i in 0..3 {
        let message = message_at(room_id, base, i);
        harness.repo.save(&message).await.unwrap();
    }
    harness.service.clone().start_backfill(room_id);
    harness.service.leave_room(room_id).await;

    assert!(harness.service.room_messages(room_id).await.is_empty());

    // 重新进入房间后回填从头开始，数据完整
    let merged = harness.service.backfill(room_id).await.unwrap();
    assert_eq!(merged, 3);
}
