//! 主应用程序入口
//!
//! 装配存储、目录、连接登记表与服务，启动 Axum Web API。

use std::sync::Arc;
use std::time::Duration;

use application::services::{
    MessageService, MessageServiceDependencies, RoomService, RoomServiceDependencies,
};
use application::{PresenceRegistry, RoomSequencer, SystemClock};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, ConnectionHub, PgMessageRepository, PgRoomRepository, PgUserDirectory,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, ConnectionAuthenticator, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').last().unwrap_or("unknown")
    );

    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    // 存储与外部协作方
    let room_repository = Arc::new(PgRoomRepository::new(pg_pool.clone()));
    let message_repository = Arc::new(PgMessageRepository::new(pg_pool.clone()));
    let directory: Arc<dyn application::UserDirectory> =
        Arc::new(PgUserDirectory::new(pg_pool));

    // 进程级共享状态：构造一次，按句柄传给需要的组件
    let clock: Arc<dyn application::Clock> = Arc::new(SystemClock);
    let hub = Arc::new(ConnectionHub::new());
    let presence = Arc::new(PresenceRegistry::new());
    let sequencer = Arc::new(RoomSequencer::new());

    let room_service = RoomService::new(RoomServiceDependencies {
        room_repository: room_repository.clone(),
        message_repository: message_repository.clone(),
        directory: directory.clone(),
        presence: presence.clone(),
        clock: clock.clone(),
    });

    let message_service = MessageService::new(MessageServiceDependencies {
        room_repository,
        message_repository,
        directory: directory.clone(),
        broadcaster: hub.clone(),
        sequencer,
        clock,
    });

    // 连接认证器
    let jwt_service = JwtService::new(config.jwt.clone());
    let authenticator = Arc::new(ConnectionAuthenticator::new(jwt_service, directory.clone()));

    let state = AppState::new(
        Arc::new(room_service),
        Arc::new(message_service),
        hub,
        presence,
        directory,
        authenticator,
        Duration::from_secs(config.realtime.heartbeat_timeout_secs),
    );

    // 启动 Web 服务器
    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("住宿消息服务启动在 http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
