//! 通知与审计适配器
//!
//! 真实推送通道（APNs/FCM 网关）在部署侧接入；这里提供日志型
//! 通知器作为默认实现，以及把违规记录落到 moderation_log 表的
//! 审计写入器。两者都只承诺尽力而为。

use std::sync::Arc;

use async_trait::async_trait;
use domain::{GroupId, Match, RepositoryError, RoomId, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use application::moderation::{ViolationRecord, ViolationSink};
use application::notifier::{MatchNotifier, NotifyError};

use crate::repository::map_sqlx_err;

/// 把通知事件写入结构化日志的默认通知器。
#[derive(Debug, Default, Clone)]
pub struct LoggingNotifier;

#[async_trait]
impl MatchNotifier for LoggingNotifier {
    async fn notify_match(&self, user_id: UserId, matched: &Match) -> Result<(), NotifyError> {
        tracing::info!(
            user_id = %user_id,
            room_id = %matched.room_id,
            group_id = %matched.group_id,
            "매칭 성사 알림"
        );
        Ok(())
    }

    async fn notify_liked(&self, user_id: UserId, group_id: GroupId) -> Result<(), NotifyError> {
        // 匿名聚合信号：日志里也不出现点赞者
        tracing::info!(user_id = %user_id, group_id = %group_id, "새로운 관심 알림");
        Ok(())
    }

    async fn notify_message(
        &self,
        user_id: UserId,
        room_id: RoomId,
        preview: &str,
    ) -> Result<(), NotifyError> {
        tracing::info!(user_id = %user_id, room_id = %room_id, preview, "새 메시지 알림");
        Ok(())
    }
}

/// 把违规记录写入 moderation_log 表。
///
/// 调用方（审核门）以 fire-and-forget 方式使用，这里的失败
/// 只会变成一条 warn 日志。
#[derive(Clone)]
pub struct PgViolationSink {
    pool: Arc<PgPool>,
}

impl PgViolationSink {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ViolationSink for PgViolationSink {
    async fn record(&self, violation: ViolationRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO moderation_log
                (author_id, context, severity, reasons, excerpt, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::from(violation.author_id))
        .bind(violation.context.to_string())
        .bind(violation.severity.to_string())
        .bind(&violation.reasons)
        .bind(&violation.excerpt)
        .bind(violation.occurred_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }
}
