//! 基础设施层
//!
//! 存储接口的 PostgreSQL 实现、进程内广播传输、日志型通知器。
//! 跨记录不变量全部落在数据库事务与唯一约束上。

pub mod db;
pub mod notify;
pub mod repository;
pub mod transport;

pub use db::create_pg_pool;
pub use notify::{LoggingNotifier, PgViolationSink};
pub use repository::{
    PgGroupRepository, PgInterestRepository, PgMatchRepository, PgMessageRepository,
    PgUserRepository,
};
pub use transport::{LocalBroadcastTransport, WireEvent};
