use crate::errors::DomainError;
use crate::value_objects::{ConversationId, MessageId, Timestamp, UserId};

/// 两个用户之间的会话。
///
/// `participants` 保留插入顺序（发起者在前）；`message_ids` 只追加，
/// 追加顺序即提交顺序。同一对用户最多存在一个会话，由存储层的
/// 规范化唯一索引保证。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: [UserId; 2],
    pub message_ids: Vec<MessageId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Conversation {
    /// 在首条消息发出时惰性创建会话。
    pub fn start(
        id: ConversationId,
        initiator: UserId,
        receiver: UserId,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        if initiator == receiver {
            return Err(DomainError::invalid_argument(
                "participants",
                "participants must be two distinct users",
            ));
        }
        Ok(Self {
            id,
            participants: [initiator, receiver],
            message_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// 与参与者顺序无关的规范化键，用于按用户对查找。
    pub fn participant_pair(&self) -> (UserId, UserId) {
        normalized_pair(self.participants[0], self.participants[1])
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn other_participant(&self, user_id: UserId) -> Option<UserId> {
        match self.participants {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }

    pub fn append_message(&mut self, message_id: MessageId, now: Timestamp) {
        self.message_ids.push(message_id);
        self.updated_at = now;
    }

    pub fn latest_message_id(&self) -> Option<MessageId> {
        self.message_ids.last().copied()
    }
}

/// 对用户对做排序规范化，(a, b) 与 (b, a) 得到同一个键。
pub fn normalized_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
