//! 群组实体
//!
//! 群组限定了谁可以向谁表达兴趣以及有效期限。过期或停用的群组
//! 对写入操作关闭处理。

use serde::{Deserialize, Serialize};

use crate::value_objects::{GroupId, Timestamp};

/// 群组类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupType {
    /// 官方运营群组
    Official,
    /// 用户自建群组
    Created,
    /// 一次性场景群组（活动、聚会）
    Instance,
    /// 基于地理位置的群组
    Location,
}

impl GroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Official => "official",
            Self::Created => "created",
            Self::Instance => "instance",
            Self::Location => "location",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub group_type: GroupType,
    /// 过期时间；`None` 表示长期有效
    pub expires_at: Option<Timestamp>,
    pub is_active: bool,
    pub created_at: Timestamp,
}

impl Group {
    pub fn new(
        id: GroupId,
        name: impl Into<String>,
        group_type: GroupType,
        expires_at: Option<Timestamp>,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            group_type,
            expires_at,
            is_active: true,
            created_at: now,
        }
    }

    /// 群组在给定时刻是否开放写入。
    pub fn is_open_at(&self, now: Timestamp) -> bool {
        if !self.is_active {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }
}
