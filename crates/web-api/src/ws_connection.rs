use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::AppState;
use domain::UserId;

/// WebSocket 连接管理器
///
/// 封装单个连接的完整生命周期：
/// - 已认证连接注册到在线状态表，接收事件推送
/// - 匿名连接保持打开但不注册，收不到任何事件
/// - 断开时按 (用户, 连接) 精确注销，不影响同一用户的其他连接
pub struct WebSocketConnection {
    state: AppState,
    identity: Option<UserId>,
}

impl WebSocketConnection {
    pub fn new(state: AppState, identity: Option<UserId>) -> Self {
        Self { state, identity }
    }

    pub async fn run(self, socket: WebSocket) {
        match self.identity {
            Some(user_id) => self.run_authenticated(socket, user_id).await,
            None => {
                // 认证失败不关闭连接也不报错，挂起即可
                tracing::debug!("anonymous websocket connected");
                Self::run_anonymous(socket).await;
            }
        }
    }

    async fn run_authenticated(self, socket: WebSocket, user_id: UserId) {
        let connection_id = Uuid::new_v4();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        self.state
            .presence
            .register(user_id, connection_id, event_tx)
            .await;
        tracing::info!(%user_id, %connection_id, "websocket connected");

        let (mut sender, mut incoming) = socket.split();

        loop {
            tokio::select! {
                Some(event) = event_rx.recv() => {
                    let payload = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to serialize websocket payload");
                            continue;
                        }
                    };
                    if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                maybe_message = incoming.next() => {
                    match maybe_message {
                        Some(Ok(message)) => {
                            if Self::handle_incoming(message, &mut sender).await.is_err() {
                                break;
                            }
                        }
                        _ => break,
                    }
                }
            }
        }

        // 只清理本连接，同一用户的其他设备保持在线
        self.state.presence.deregister(user_id, connection_id).await;
        tracing::info!(%user_id, %connection_id, "websocket disconnected");
    }

    /// 匿名连接只回应心跳，不参与任何事件推送。
    async fn run_anonymous(socket: WebSocket) {
        let (mut sender, mut incoming) = socket.split();
        while let Some(Ok(message)) = incoming.next().await {
            if Self::handle_incoming(message, &mut sender).await.is_err() {
                break;
            }
        }
    }

    /// 处理来自客户端的消息：关闭、心跳，其余忽略。
    /// 客户端发消息走 HTTP 接口，这条连接是单向推送通道。
    async fn handle_incoming(
        message: WsMessage,
        sender: &mut (impl SinkExt<WsMessage> + Unpin),
    ) -> Result<(), ()> {
        match message {
            WsMessage::Close(_) => Err(()),
            WsMessage::Ping(data) => {
                if sender.send(WsMessage::Pong(data)).await.is_err() {
                    return Err(());
                }
                Ok(())
            }
            WsMessage::Pong(_) => Ok(()),
            WsMessage::Text(_) | WsMessage::Binary(_) => {
                tracing::debug!("ignoring inbound websocket payload");
                Ok(())
            }
        }
    }
}
