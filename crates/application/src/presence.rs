use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::broadcaster::ServerEvent;
use domain::UserId;

/// 单个连接的标识。注销以 (用户, 连接) 为键，
/// 同一用户的多个并发连接互不影响。
pub type ConnectionId = Uuid;

/// 连接的事件发送端。无界通道的 send 不阻塞，
/// 掉线的接收端只会让 send 失败，由调用方忽略。
pub type ConnectionSender = mpsc::UnboundedSender<ServerEvent>;

/// 进程内在线状态注册表。
///
/// 用户标识到连接句柄集合的映射：注册/查找/注销均为 O(1)/O(k)。
/// 仅存在于进程内存中，重启即清空，不跨进程共享。
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    connections: RwLock<HashMap<UserId, HashMap<ConnectionId, ConnectionSender>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个已认证连接，立即对查找可见。
    /// 同一用户允许任意多个并发连接（多设备/多标签页）。
    pub async fn register(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
        sender: ConnectionSender,
    ) {
        let mut connections = self.connections.write().await;
        connections
            .entry(user_id)
            .or_default()
            .insert(connection_id, sender);

        tracing::debug!(%user_id, %connection_id, "connection registered");
    }

    /// 按具体连接注销；用户最后一个连接移除后清掉用户键。
    pub async fn deregister(&self, user_id: UserId, connection_id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(user_connections) = connections.get_mut(&user_id) {
            user_connections.remove(&connection_id);
            if user_connections.is_empty() {
                connections.remove(&user_id);
            }
        }

        tracing::debug!(%user_id, %connection_id, "connection deregistered");
    }

    /// 给定用户集合的全部在线连接句柄。
    pub async fn lookup(&self, user_ids: &[UserId]) -> Vec<ConnectionSender> {
        let connections = self.connections.read().await;
        user_ids
            .iter()
            .filter_map(|user_id| connections.get(user_id))
            .flat_map(|user_connections| user_connections.values().cloned())
            .collect()
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        let connections = self.connections.read().await;
        connections
            .get(&user_id)
            .map(|user_connections| !user_connections.is_empty())
            .unwrap_or(false)
    }

    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.values().map(HashMap::len).sum()
    }
}
