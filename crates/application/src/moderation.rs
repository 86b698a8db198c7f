//! 审核门的应用层封装
//!
//! 检测与过滤走领域层的纯函数；命中违规时异步补写一条审计记录，
//! 写入失败只记日志，永远不阻塞也不影响调用方。

use std::sync::Arc;

use async_trait::async_trait;
use domain::moderation::{self, FilteredText, Severity, ValidationContext};
use domain::{DomainError, RepositoryError, Timestamp, UserId};

use crate::clock::Clock;
use crate::error::ApplicationError;

/// 违规审计记录。
#[derive(Debug, Clone)]
pub struct ViolationRecord {
    pub author_id: UserId,
    pub context: ValidationContext,
    pub severity: Severity,
    pub reasons: Vec<String>,
    /// 原文截断到 200 字符
    pub excerpt: String,
    pub occurred_at: Timestamp,
}

#[async_trait]
pub trait ViolationSink: Send + Sync {
    async fn record(&self, violation: ViolationRecord) -> Result<(), RepositoryError>;
}

pub struct ModerationGate {
    sink: Arc<dyn ViolationSink>,
    clock: Arc<dyn Clock>,
}

impl ModerationGate {
    pub fn new(sink: Arc<dyn ViolationSink>, clock: Arc<dyn Clock>) -> Self {
        Self { sink, clock }
    }

    /// 检查一段出站文本。
    ///
    /// HIGH 直接以 `ContentRejected` 中止（调用方此时尚未产生副作用）；
    /// MEDIUM 返回脱敏后的文本；其余原样放行。
    pub fn check(
        &self,
        author_id: UserId,
        text: &str,
        context: ValidationContext,
    ) -> Result<FilteredText, ApplicationError> {
        let report = moderation::validate(text, context);

        if let Some(severity) = report.severity() {
            self.log_violation(author_id, text, context, severity, report.reasons());
            if severity == Severity::High {
                return Err(DomainError::ContentRejected {
                    severity,
                    reasons: report.reasons(),
                }
                .into());
            }
        }

        Ok(moderation::filter_text(text, context))
    }

    fn log_violation(
        &self,
        author_id: UserId,
        text: &str,
        context: ValidationContext,
        severity: Severity,
        reasons: Vec<String>,
    ) {
        let record = ViolationRecord {
            author_id,
            context,
            severity,
            reasons,
            excerpt: text.chars().take(200).collect(),
            occurred_at: self.clock.now(),
        };
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            if let Err(err) = sink.record(record).await {
                tracing::warn!(error = %err, "违规日志写入失败");
            }
        });
    }
}
