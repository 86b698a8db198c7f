//! 主应用程序入口
//!
//! 组装存储、审核门、匹配引擎与消息同步层，并把输入中清扫任务和
//! 进程内投递循环绑定到连接生命周期上：连接建立时启动、断开时
//! 对称停止，重连不会堆积定时器。

use std::sync::Arc;

use application::{
    ChatSyncService, ChatSyncServiceDependencies, Clock, MatchNotifier, MatchRepository,
    MatchService, MatchServiceDependencies, ModerationGate, SystemClock, TypingSweeper,
    TypingTracker,
};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, LocalBroadcastTransport, LoggingNotifier, PgGroupRepository,
    PgInterestRepository, PgMatchRepository, PgMessageRepository, PgUserRepository,
    PgViolationSink, WireEvent,
};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env();
    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').last().unwrap_or("unknown")
    );

    let pool = Arc::new(
        create_pg_pool(&config.database.url, config.database.max_connections).await?,
    );

    // 运行迁移
    sqlx::migrate!("../../migrations").run(pool.as_ref()).await?;

    // 仓储
    let user_repository = Arc::new(PgUserRepository::new(pool.clone()));
    let group_repository = Arc::new(PgGroupRepository::new(pool.clone()));
    let interest_repository = Arc::new(PgInterestRepository::new(pool.clone()));
    let match_repository: Arc<dyn MatchRepository> =
        Arc::new(PgMatchRepository::new(pool.clone()));
    let message_repository = Arc::new(PgMessageRepository::new(pool.clone()));

    // 横切组件
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let moderation = Arc::new(ModerationGate::new(
        Arc::new(PgViolationSink::new(pool.clone())),
        clock.clone(),
    ));
    let notifier: Arc<dyn MatchNotifier> = Arc::new(LoggingNotifier);
    let transport = Arc::new(LocalBroadcastTransport::new(config.sync.broadcast_capacity));

    // 应用层服务。匹配引擎在这里组装好交给接入层挂载；
    // 本进程自身只托管同步层与清扫任务的生命周期。
    let _match_service = Arc::new(MatchService::new(MatchServiceDependencies {
        user_repository,
        group_repository,
        interest_repository,
        match_repository: match_repository.clone(),
        moderation: moderation.clone(),
        notifier: notifier.clone(),
        clock: clock.clone(),
    }));

    let sync_service = Arc::new(ChatSyncService::new(
        ChatSyncServiceDependencies {
            message_repository,
            transport: transport.clone(),
            moderation,
            clock: clock.clone(),
        },
        config.sync.backfill_page_size,
    ));

    let typing_tracker = Arc::new(TypingTracker::new(clock, config.typing.ttl_secs));
    let sweeper = TypingSweeper::new(typing_tracker, config.typing.sweep_interval_secs);

    // "连接建立"：启动清扫任务与投递循环
    sweeper.start();
    let delivery = tokio::spawn(run_delivery_loop(
        transport.subscribe(),
        sync_service,
        match_repository,
        notifier,
    ));

    tracing::info!("matchroom core ready");
    tokio::signal::ctrl_c().await?;

    // "连接断开"：对称地停掉两个任务
    sweeper.stop();
    delivery.abort();
    tracing::info!("shutdown complete");
    Ok(())
}

/// 进程内投递循环。
///
/// 消息事件先走同步层的 ingest（乐观副本的回声在这里被去重吸收），
/// 再按房间归属给对端发尽力而为的推送；已读事件只更新本地时间线。
async fn run_delivery_loop(
    mut events: broadcast::Receiver<WireEvent>,
    sync_service: Arc<ChatSyncService>,
    match_repository: Arc<dyn MatchRepository>,
    notifier: Arc<dyn MatchNotifier>,
) {
    loop {
        match events.recv().await {
            Ok(WireEvent::Message(message)) => {
                sync_service.ingest_incoming(message.clone()).await;

                match match_repository.find_by_room(message.room_id).await {
                    Ok(Some(matched)) => {
                        if let Some(recipient) = matched.counterpart_of(message.sender_id) {
                            if let Err(err) = notifier
                                .notify_message(recipient, message.room_id, &message.preview(40))
                                .await
                            {
                                tracing::warn!(error = %err, "메시지 알림 실패");
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, room_id = %message.room_id, "房间归属查询失败");
                    }
                }
            }
            Ok(WireEvent::MessageRead {
                room_id,
                message_id,
                reader,
            }) => {
                sync_service
                    .apply_read_receipt(room_id, message_id, reader)
                    .await;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "投递循环落后，依赖重连回填补齐");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
