//! 输入中信号
//!
//! 短生命周期状态：按键时创建，显式停止或 TTL 扫描时移除。
//! 超过 TTL 的信号无论是否收到停止事件都不再呈现。

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::value_objects::{RoomId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingSignal {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub last_signal_at: Timestamp,
}

impl TypingSignal {
    pub fn new(user_id: UserId, room_id: RoomId, now: Timestamp) -> Self {
        Self {
            user_id,
            room_id,
            last_signal_at: now,
        }
    }

    /// 再次收到按键信号时刷新时间戳。
    pub fn refresh(&mut self, now: Timestamp) {
        self.last_signal_at = now;
    }

    pub fn is_stale(&self, now: Timestamp, ttl: Duration) -> bool {
        now - self.last_signal_at > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn signal_goes_stale_after_ttl() {
        let now = Utc::now();
        let signal = TypingSignal::new(
            UserId::new(Uuid::new_v4()),
            RoomId::new(Uuid::new_v4()),
            now,
        );
        let ttl = Duration::seconds(5);

        assert!(!signal.is_stale(now + Duration::seconds(5), ttl));
        assert!(signal.is_stale(now + Duration::seconds(6), ttl));
    }

    #[test]
    fn refresh_extends_lifetime() {
        let now = Utc::now();
        let mut signal = TypingSignal::new(
            UserId::new(Uuid::new_v4()),
            RoomId::new(Uuid::new_v4()),
            now,
        );
        let ttl = Duration::seconds(5);

        signal.refresh(now + Duration::seconds(4));
        assert!(!signal.is_stale(now + Duration::seconds(8), ttl));
    }
}
