use crate::errors::DomainError;
use crate::value_objects::{MessageBody, MessageId, Timestamp, UserId};

/// 私信消息。创建后不可变，始终归属于唯一的一个会话。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub body: MessageBody,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        sender_id: UserId,
        receiver_id: UserId,
        body: MessageBody,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if sender_id == receiver_id {
            return Err(DomainError::invalid_argument(
                "receiver_id",
                "cannot message yourself",
            ));
        }
        Ok(Self {
            id,
            sender_id,
            receiver_id,
            body,
            created_at,
        })
    }
}
