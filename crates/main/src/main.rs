//! 主应用程序入口
//!
//! 启动私信与在线状态服务。

use std::sync::Arc;

use application::services::MessageService;
use application::{Clock, EventBroadcaster, PresenceFanout, PresenceRegistry, SystemClock};
use axum::http::{header, HeaderValue, Method};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, PgConversationRepository, PgMessageRepository, PgUserRepository,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 读取并验证配置，缺失关键变量直接终止启动
    let config = AppConfig::from_env();
    config.validate()?;

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').next_back().unwrap_or("unknown")
    );

    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    // 仓储实例
    let conversation_repository = Arc::new(PgConversationRepository::new(pg_pool.clone()));
    let message_repository = Arc::new(PgMessageRepository::new(pg_pool.clone()));
    let user_repository = Arc::new(PgUserRepository::new(pg_pool));

    // 在线状态注册表与事件扇出
    let presence = Arc::new(PresenceRegistry::new());
    let broadcaster: Arc<dyn EventBroadcaster> = Arc::new(PresenceFanout::new(presence.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let message_service = Arc::new(MessageService::new(
        conversation_repository,
        message_repository,
        user_repository,
        clock,
        broadcaster,
    ));

    let jwt_service = JwtService::new(config.jwt.clone());

    let state = AppState::new(message_service, presence, jwt_service);

    // 凭证随请求携带（jwt cookie），CORS 必须列出具体来源而不能用通配
    let allowed_origins: Vec<HeaderValue> = config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::PUT, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    let app = router(state).layer(cors).layer(TraceLayer::new_for_http());

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!("私信服务器启动在 http://{}", address);
    axum::serve(listener, app).await?;

    Ok(())
}
