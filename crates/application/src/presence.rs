//! 输入中状态跟踪
//!
//! 每个房间维护 {用户 -> 最后信号时间}。读取时先按 TTL 过滤，
//! 即使清扫还没跑到，过期信号也不会被呈现；清扫任务进程内只有
//! 一个，随连接生命周期显式启停，重连循环不会堆积定时器。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration as StdDuration;

use chrono::Duration;
use domain::{RoomId, TypingSignal, UserId};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::clock::Clock;

pub struct TypingTracker {
    rooms: RwLock<HashMap<RoomId, HashMap<UserId, TypingSignal>>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl TypingTracker {
    pub fn new(clock: Arc<dyn Clock>, ttl_secs: i64) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            clock,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// 按键时 upsert（已有信号只刷新时间戳），显式停止时移除。
    pub async fn set_typing(&self, room_id: RoomId, user_id: UserId, is_typing: bool) {
        let now = self.clock.now();
        let mut rooms = self.rooms.write().await;
        if is_typing {
            rooms
                .entry(room_id)
                .or_default()
                .entry(user_id)
                .and_modify(|signal| signal.refresh(now))
                .or_insert_with(|| TypingSignal::new(user_id, room_id, now));
        } else if let Some(room) = rooms.get_mut(&room_id) {
            room.remove(&user_id);
            if room.is_empty() {
                rooms.remove(&room_id);
            }
        }
    }

    /// 当前房间内"输入中"的用户。超过 TTL 的信号无条件过滤，
    /// 不依赖显式停止事件是否送达。
    pub async fn typing_users(&self, room_id: RoomId) -> Vec<UserId> {
        let now = self.clock.now();
        let rooms = self.rooms.read().await;
        rooms
            .get(&room_id)
            .map(|room| {
                room.values()
                    .filter(|signal| !signal.is_stale(now, self.ttl))
                    .map(|signal| signal.user_id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 单轮清扫：移除所有过期信号，返回驱逐数量。
    pub async fn sweep_once(&self) -> usize {
        let now = self.clock.now();
        let mut rooms = self.rooms.write().await;
        let mut evicted = 0;
        rooms.retain(|_, room| {
            room.retain(|_, signal| {
                let fresh = !signal.is_stale(now, self.ttl);
                if !fresh {
                    evicted += 1;
                }
                fresh
            });
            !room.is_empty()
        });
        evicted
    }

    /// 离开房间时清掉整个房间的输入状态。
    pub async fn clear_room(&self, room_id: RoomId) {
        self.rooms.write().await.remove(&room_id);
    }
}

/// 进程级清扫任务。
///
/// `start` 幂等：已在运行时再次调用是空操作，防止断线重连把
/// 定时器越积越多；`stop` 在断开连接时中止任务。
pub struct TypingSweeper {
    tracker: Arc<TypingTracker>,
    interval: StdDuration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TypingSweeper {
    pub fn new(tracker: Arc<TypingTracker>, interval_secs: u64) -> Self {
        Self {
            tracker,
            interval: StdDuration::from_secs(interval_secs),
            handle: Mutex::new(None),
        }
    }

    /// 连接建立时调用。返回是否真正启动了新任务。
    pub fn start(&self) -> bool {
        let mut guard = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return false;
            }
        }

        let tracker = Arc::clone(&self.tracker);
        let period = self.interval;
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // 第一个 tick 立即完成，跳过它
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = tracker.sweep_once().await;
                if evicted > 0 {
                    tracing::debug!(evicted, "清扫过期输入信号");
                }
            }
        }));
        true
    }

    /// 断开连接时调用。返回是否中止了正在运行的任务。
    pub fn stop(&self) -> bool {
        let mut guard = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        let guard = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TypingSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::Timestamp;
    use uuid::Uuid;

    /// 手动推进的测试时钟。
    struct ManualClock {
        now: Mutex<Timestamp>,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Utc::now()),
            })
        }

        fn advance(&self, secs: i64) {
            let mut now = self.now.lock().unwrap();
            *now += Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Timestamp {
            *self.now.lock().unwrap()
        }
    }

    #[tokio::test]
    async fn typing_signal_appears_and_expires_without_stop_event() {
        let clock = ManualClock::new();
        let tracker = TypingTracker::new(clock.clone(), 5);
        let room = RoomId::new(Uuid::new_v4());
        let user = UserId::new(Uuid::new_v4());

        tracker.set_typing(room, user, true).await;
        assert_eq!(tracker.typing_users(room).await, vec![user]);

        // 超过 TTL：没有显式停止事件也不再呈现
        clock.advance(6);
        assert!(tracker.typing_users(room).await.is_empty());
    }

    #[tokio::test]
    async fn refreshed_signal_stays_alive() {
        let clock = ManualClock::new();
        let tracker = TypingTracker::new(clock.clone(), 5);
        let room = RoomId::new(Uuid::new_v4());
        let user = UserId::new(Uuid::new_v4());

        tracker.set_typing(room, user, true).await;
        clock.advance(4);
        tracker.set_typing(room, user, true).await;
        clock.advance(4);
        assert_eq!(tracker.typing_users(room).await, vec![user]);
    }

    #[tokio::test]
    async fn explicit_stop_removes_signal() {
        let clock = ManualClock::new();
        let tracker = TypingTracker::new(clock.clone(), 5);
        let room = RoomId::new(Uuid::new_v4());
        let user = UserId::new(Uuid::new_v4());

        tracker.set_typing(room, user, true).await;
        tracker.set_typing(room, user, false).await;
        assert!(tracker.typing_users(room).await.is_empty());
    }

    #[tokio::test]
    async fn sweep_evicts_only_stale_entries() {
        let clock = ManualClock::new();
        let tracker = TypingTracker::new(clock.clone(), 5);
        let room = RoomId::new(Uuid::new_v4());
        let stale = UserId::new(Uuid::new_v4());
        let fresh = UserId::new(Uuid::new_v4());

        tracker.set_typing(room, stale, true).await;
        clock.advance(6);
        tracker.set_typing(room, fresh, true).await;

        assert_eq!(tracker.sweep_once().await, 1);
        assert_eq!(tracker.typing_users(room).await, vec![fresh]);
    }

    #[tokio::test]
    async fn sweeper_start_is_idempotent() {
        let clock = ManualClock::new();
        let tracker = Arc::new(TypingTracker::new(clock, 5));
        let sweeper = TypingSweeper::new(tracker, 5);

        assert!(sweeper.start());
        // 重连路径上的第二次 start 不得再起一个定时器
        assert!(!sweeper.start());
        assert!(sweeper.is_running());

        assert!(sweeper.stop());
        assert!(!sweeper.is_running());
        assert!(!sweeper.stop());

        // 停止后可以重新启动
        assert!(sweeper.start());
        sweeper.stop();
    }
}
