use std::sync::Arc;

use crate::broadcaster::{EventBroadcaster, ServerEvent};
use crate::clock::Clock;
use crate::dto::{ConversationDto, ConversationSummaryDto, MessageDto};
use crate::error::ApplicationError;
use crate::repository::{ConversationRepository, MessageRepository, UserRepository};
use domain::{
    Conversation, ConversationId, DomainError, Message, MessageBody, MessageId, RepositoryError,
    UserId,
};
use uuid::Uuid;

/// 发送私信的入参。`sender_id` 来自已验证的连接身份，从不信任请求体。
#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct SendMessageOutcome {
    pub message: MessageDto,
    pub conversation_id: ConversationId,
    pub conversation_created: bool,
}

/// 消息用例服务。
///
/// 负责惰性会话创建、消息持久化和实时扇出的编排。
/// 持久化在仓储事务内完成；扇出是尽力而为，失败只记日志，
/// 绝不让已落库的消息对发送方报错。
pub struct MessageService {
    conversation_repository: Arc<dyn ConversationRepository>,
    message_repository: Arc<dyn MessageRepository>,
    user_repository: Arc<dyn UserRepository>,
    clock: Arc<dyn Clock>,
    broadcaster: Arc<dyn EventBroadcaster>,
}

impl MessageService {
    pub fn new(
        conversation_repository: Arc<dyn ConversationRepository>,
        message_repository: Arc<dyn MessageRepository>,
        user_repository: Arc<dyn UserRepository>,
        clock: Arc<dyn Clock>,
        broadcaster: Arc<dyn EventBroadcaster>,
    ) -> Self {
        Self {
            conversation_repository,
            message_repository,
            user_repository,
            clock,
            broadcaster,
        }
    }

    /// 发送一条私信。
    ///
    /// 两个用户之间首次互发时惰性创建会话；并发首发撞上唯一索引时，
    /// 输掉的一方重查已存在的会话并改走追加路径，两条消息都不丢。
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<SendMessageOutcome, ApplicationError> {
        let body = MessageBody::new(request.body)?;

        if self
            .user_repository
            .find_by_id(request.receiver_id)
            .await?
            .is_none()
        {
            return Err(DomainError::UserNotFound.into());
        }

        let now = self.clock.now();
        let message = Message::new(
            MessageId::generate(),
            request.sender_id,
            request.receiver_id,
            body,
            now,
        )?;

        let existing = self
            .conversation_repository
            .find_by_participants(request.sender_id, request.receiver_id)
            .await?;

        let (conversation_id, created_conversation) = match existing {
            Some(conversation) => {
                self.conversation_repository
                    .append_message(conversation.id, message.clone(), now)
                    .await?;
                (conversation.id, None)
            }
            None => self.create_or_append(&message, now).await?,
        };

        let outcome = SendMessageOutcome {
            message: MessageDto::from(&message),
            conversation_id,
            conversation_created: created_conversation.is_some(),
        };

        self.fan_out(&message, conversation_id, created_conversation)
            .await;

        Ok(outcome)
    }

    /// 首发路径：尝试创建会话，唯一索引冲突时重查并追加。
    async fn create_or_append(
        &self,
        message: &Message,
        now: domain::Timestamp,
    ) -> Result<(ConversationId, Option<Conversation>), ApplicationError> {
        let conversation = Conversation::start(
            ConversationId::generate(),
            message.sender_id,
            message.receiver_id,
            now,
        )?;

        match self
            .conversation_repository
            .create_with_first_message(conversation, message.clone())
            .await
        {
            Ok(created) => Ok((created.id, Some(created))),
            Err(RepositoryError::Conflict) => {
                // 并发首发输掉了创建竞争，对方的会话此刻必然可见
                tracing::debug!(
                    sender = %message.sender_id,
                    receiver = %message.receiver_id,
                    "lost conversation creation race, appending instead"
                );
                let existing = self
                    .conversation_repository
                    .find_by_participants(message.sender_id, message.receiver_id)
                    .await?
                    .ok_or_else(|| {
                        RepositoryError::storage("conversation vanished after creation conflict")
                    })?;
                self.conversation_repository
                    .append_message(existing.id, message.clone(), now)
                    .await?;
                Ok((existing.id, None))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// 向两位参与者的在线连接推送事件。任何失败都不影响本次发送的结果。
    async fn fan_out(
        &self,
        message: &Message,
        conversation_id: ConversationId,
        created_conversation: Option<Conversation>,
    ) {
        let recipients = [message.sender_id, message.receiver_id];

        let event = ServerEvent::NewMessage {
            message: MessageDto::from(message),
            conversation_id: Uuid::from(conversation_id),
        };
        if let Err(error) = self.broadcaster.broadcast_to(&recipients, event).await {
            tracing::warn!(%conversation_id, %error, "failed to fan out new message");
        }

        let Some(conversation) = created_conversation else {
            return;
        };
        match self.populate_conversation(&conversation).await {
            Ok(dto) => {
                let event = ServerEvent::NewConversation { conversation: dto };
                if let Err(error) = self.broadcaster.broadcast_to(&recipients, event).await {
                    tracing::warn!(%conversation_id, %error, "failed to fan out new conversation");
                }
            }
            Err(error) => {
                tracing::warn!(%conversation_id, %error, "failed to populate new conversation");
            }
        }
    }

    /// 读取单个会话的完整内容。
    ///
    /// 不存在的会话和无权访问的会话返回同一个错误，
    /// 不给调用方探测会话是否存在的余地。
    pub async fn get_conversation(
        &self,
        requester: UserId,
        conversation_id: ConversationId,
    ) -> Result<ConversationDto, ApplicationError> {
        let conversation = self
            .conversation_repository
            .find_by_id(conversation_id)
            .await?
            .ok_or(ApplicationError::Authentication)?;

        if !conversation.involves(requester) {
            return Err(ApplicationError::Authentication);
        }

        self.populate_conversation(&conversation).await
    }

    /// 收件箱：请求者参与的全部会话摘要，按最近活跃排序。
    pub async fn list_conversations(
        &self,
        requester: UserId,
    ) -> Result<Vec<ConversationSummaryDto>, ApplicationError> {
        let conversations = self.conversation_repository.list_by_user(requester).await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in &conversations {
            let participants = self
                .user_repository
                .find_profiles(&conversation.participants)
                .await?;
            let latest = self
                .message_repository
                .find_latest(conversation.id)
                .await?;
            summaries.push(ConversationSummaryDto::populate(
                conversation,
                &participants,
                latest.as_ref(),
            ));
        }
        Ok(summaries)
    }

    async fn populate_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<ConversationDto, ApplicationError> {
        let participants = self
            .user_repository
            .find_profiles(&conversation.participants)
            .await?;
        let messages = self
            .message_repository
            .list_by_conversation(conversation.id)
            .await?;
        Ok(ConversationDto::populate(
            conversation,
            &participants,
            &messages,
        ))
    }
}
