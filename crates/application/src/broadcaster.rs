use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::dto::{ConversationDto, MessageDto};
use crate::presence::PresenceRegistry;
use domain::UserId;

/// 推送给已连接客户端的服务端事件。
/// `event` 字段作为判别器，负载字段与事件同名。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ServerEvent {
    #[serde(rename = "newMessage")]
    NewMessage {
        #[serde(rename = "newMessage")]
        message: MessageDto,
        #[serde(rename = "conversationId")]
        conversation_id: Uuid,
    },
    #[serde(rename = "newConversation")]
    NewConversation {
        #[serde(rename = "newConversation")]
        conversation: ConversationDto,
    },
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Delivery(String),
}

/// 事件扇出的抽象。消息服务只依赖这个 trait，
/// 测试里用内存实现替换真正的连接注册表。
#[async_trait]
pub trait EventBroadcaster: Send + Sync {
    /// 向给定接收者的全部在线连接投递事件。
    /// 尽力而为：离线用户直接跳过，单个连接投递失败不影响其余连接。
    async fn broadcast_to(
        &self,
        recipients: &[UserId],
        event: ServerEvent,
    ) -> Result<(), BroadcastError>;
}

/// 基于在线注册表的扇出实现。
/// 只向事件相关的参与者投递，从不全站广播。
pub struct PresenceFanout {
    presence: Arc<PresenceRegistry>,
}

impl PresenceFanout {
    pub fn new(presence: Arc<PresenceRegistry>) -> Self {
        Self { presence }
    }
}

#[async_trait]
impl EventBroadcaster for PresenceFanout {
    async fn broadcast_to(
        &self,
        recipients: &[UserId],
        event: ServerEvent,
    ) -> Result<(), BroadcastError> {
        let senders = self.presence.lookup(recipients).await;
        if senders.is_empty() {
            return Ok(());
        }

        let mut delivered = 0usize;
        for sender in &senders {
            // 接收端随连接关闭而掉线，发送失败只记录不上抛
            if sender.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }

        tracing::debug!(
            recipients = recipients.len(),
            connections = senders.len(),
            delivered,
            "event fanned out"
        );
        Ok(())
    }
}
