use async_trait::async_trait;
use domain::{
    Conversation, ConversationId, Message, MessageId, Participant, RepositoryError, Timestamp,
    User, UserId,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// 参与者档案投影：实现方不得选取凭证列。
    async fn find_profiles(&self, ids: &[UserId]) -> Result<Vec<Participant>, RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// 按规范化的用户对查找，与参与者顺序无关。
    async fn find_by_participants(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    /// 按最近活跃排序列出用户参与的全部会话。
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Conversation>, RepositoryError>;

    /// 单个事务内插入会话和首条消息。
    /// 规范化用户对的唯一索引冲突返回 `RepositoryError::Conflict`，
    /// 调用方据此重查并走追加路径，而不是当作致命错误。
    async fn create_with_first_message(
        &self,
        conversation: Conversation,
        message: Message,
    ) -> Result<Conversation, RepositoryError>;

    /// 单个事务内持久化消息并推进会话的 `updated_at`。
    /// 事务中任何一步失败都整体回滚，消息不会落库。
    async fn append_message(
        &self,
        conversation_id: ConversationId,
        message: Message,
        now: Timestamp,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;

    /// 会话内的全部消息，按提交顺序排列。
    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// 会话内最近一条消息，用于收件箱摘要。
    async fn find_latest(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Message>, RepositoryError>;
}
