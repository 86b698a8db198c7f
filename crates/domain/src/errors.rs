//! 领域模型错误定义
//!
//! 定义匹配与消息核心的所有失败语义，错误即契约：
//! 任何携带这些错误返回的操作都保证没有留下部分写入。

use thiserror::Error;

use crate::moderation::Severity;
use crate::value_objects::GroupId;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 内容未通过审核（HIGH 级别），操作未产生任何副作用
    #[error("content rejected by moderation: {reasons:?}")]
    ContentRejected {
        severity: Severity,
        reasons: Vec<String>,
    },

    /// 点赞额度不足，余额与兴趣表均未改动
    #[error("insufficient credits: required {required}, balance {balance}")]
    InsufficientCredits { required: i32, balance: i32 },

    /// 群组已过期或被停用，关闭处理，不记录兴趣
    #[error("group not active: {group_id}")]
    GroupNotActive { group_id: GroupId },

    /// 双方尚未匹配，昵称等身份信息不可见
    #[error("users are not matched")]
    NotMatched,

    /// 参数验证错误
    #[error("invalid {field}: {message}")]
    InvalidArgument { field: String, message: String },

    /// 业务规则违反错误
    #[error("business rule violation: {rule}")]
    BusinessRuleViolation { rule: String },
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn business_rule_violation(rule: impl Into<String>) -> Self {
        Self::BusinessRuleViolation { rule: rule.into() }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 存储层错误。
///
/// 唯一约束冲突不会出现在这里：仓储实现把重复写入归一化为
/// 成功语义（见应用层的 `InterestWrite` / `MatchWrite`）。
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("record not found")]
    NotFound,
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
