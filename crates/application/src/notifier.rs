use async_trait::async_trait;
use domain::{GroupId, Match, RoomId, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notify failed: {0}")]
    Failed(String),
}

impl NotifyError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 可插拔的推送通知接口。
///
/// 所有调用都是尽力而为：失败只记日志，绝不影响主操作。
/// 匹配成立前的点赞通知只携带聚合信号，不暴露点赞者身份。
#[async_trait]
pub trait MatchNotifier: Send + Sync {
    /// 匹配成立，双方各收到一条。
    async fn notify_match(&self, user_id: UserId, matched: &Match) -> Result<(), NotifyError>;

    /// 有人表达了兴趣。匿名：不含来源用户。
    async fn notify_liked(&self, user_id: UserId, group_id: GroupId) -> Result<(), NotifyError>;

    /// 新消息提醒。
    async fn notify_message(
        &self,
        user_id: UserId,
        room_id: RoomId,
        preview: &str,
    ) -> Result<(), NotifyError>;
}
