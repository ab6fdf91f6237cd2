//! 基础设施层。
//!
//! Postgres 仓储实现：应用层的仓储 trait 在这里落到 sqlx 查询上，
//! 事务语义（首条消息 + 会话创建、追加 + 活跃时间推进）也在这里实现。

pub mod repository;

pub use repository::{PgConversationRepository, PgMessageRepository, PgUserRepository};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// 创建数据库连接池。失败直接上抛，由启动流程决定是否终止进程。
pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    tracing::info!(max_connections, "database pool ready");
    Ok(pool)
}
