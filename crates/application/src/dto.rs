use domain::{Conversation, Message, Participant, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 会话参与者的响应投影，凭证字段在仓储层就已剥离。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDto {
    pub id: Uuid,
    pub username: String,
}

impl From<&Participant> for ParticipantDto {
    fn from(participant: &Participant) -> Self {
        Self {
            id: Uuid::from(participant.id),
            username: participant.username.as_str().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub message: String,
    pub created_at: Timestamp,
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        Self {
            id: Uuid::from(message.id),
            sender_id: Uuid::from(message.sender_id),
            receiver_id: Uuid::from(message.receiver_id),
            message: message.body.as_str().to_owned(),
            created_at: message.created_at,
        }
    }
}

/// 填充后的完整会话：参与者档案 + 按提交顺序排列的全部消息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    pub id: Uuid,
    pub participants: Vec<ParticipantDto>,
    pub messages: Vec<MessageDto>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ConversationDto {
    pub fn populate(
        conversation: &Conversation,
        participants: &[Participant],
        messages: &[Message],
    ) -> Self {
        Self {
            id: Uuid::from(conversation.id),
            participants: participants.iter().map(ParticipantDto::from).collect(),
            messages: messages.iter().map(MessageDto::from).collect(),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

/// 收件箱式的会话摘要，只携带最近一条消息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummaryDto {
    pub id: Uuid,
    pub participants: Vec<ParticipantDto>,
    pub latest_message: Option<MessageDto>,
    pub updated_at: Timestamp,
}

impl ConversationSummaryDto {
    pub fn populate(
        conversation: &Conversation,
        participants: &[Participant],
        latest_message: Option<&Message>,
    ) -> Self {
        Self {
            id: Uuid::from(conversation.id),
            participants: participants.iter().map(ParticipantDto::from).collect(),
            latest_message: latest_message.map(MessageDto::from),
            updated_at: conversation.updated_at,
        }
    }
}
