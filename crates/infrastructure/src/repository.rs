//! sqlx 仓储实现。
//!
//! 查询结果先落到 Record 结构，再转换为领域类型；
//! 参与者档案查询从不选取凭证列。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use application::repository::{ConversationRepository, MessageRepository, UserRepository};
use domain::{
    normalized_pair, Conversation, ConversationId, Message, MessageBody, MessageId, Participant,
    PasswordHash, RepositoryError, Timestamp, User, UserEmail, UserId, Username,
};

/// 把 sqlx 错误映射到仓储错误。
/// 唯一约束冲突（23505）单独映射，调用方据此走创建竞争的重试路径。
fn map_sqlx_err(error: sqlx::Error) -> RepositoryError {
    match &error {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            RepositoryError::Conflict
        }
        _ => RepositoryError::storage(error.to_string()),
    }
}

// ---- Record 结构 ----

#[derive(sqlx::FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(record: UserRecord) -> Result<Self, Self::Error> {
        Ok(User {
            id: UserId::from(record.id),
            username: Username::parse(record.username)
                .map_err(|e| RepositoryError::storage(format!("corrupt user row: {e}")))?,
            email: UserEmail::parse(record.email)
                .map_err(|e| RepositoryError::storage(format!("corrupt user row: {e}")))?,
            password: PasswordHash::new(record.password_hash)
                .map_err(|e| RepositoryError::storage(format!("corrupt user row: {e}")))?,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ParticipantRecord {
    id: Uuid,
    username: String,
}

impl TryFrom<ParticipantRecord> for Participant {
    type Error = RepositoryError;

    fn try_from(record: ParticipantRecord) -> Result<Self, Self::Error> {
        Ok(Participant {
            id: UserId::from(record.id),
            username: Username::parse(record.username)
                .map_err(|e| RepositoryError::storage(format!("corrupt user row: {e}")))?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ConversationRecord {
    id: Uuid,
    participant_one: Uuid,
    participant_two: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversationRecord {
    fn into_conversation(self, message_ids: Vec<MessageId>) -> Conversation {
        Conversation {
            id: ConversationId::from(self.id),
            participants: [
                UserId::from(self.participant_one),
                UserId::from(self.participant_two),
            ],
            message_ids,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRecord {
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    body: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(record: MessageRecord) -> Result<Self, Self::Error> {
        Ok(Message {
            id: MessageId::from(record.id),
            sender_id: UserId::from(record.sender_id),
            receiver_id: UserId::from(record.receiver_id),
            body: MessageBody::new(record.body)
                .map_err(|e| RepositoryError::storage(format!("corrupt message row: {e}")))?,
            created_at: record.created_at,
        })
    }
}

// ---- 用户仓储 ----

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, email, password_hash, created_at, updated_at \
             FROM users WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn find_profiles(&self, ids: &[UserId]) -> Result<Vec<Participant>, RepositoryError> {
        let ids: Vec<Uuid> = ids.iter().copied().map(Uuid::from).collect();
        let records = sqlx::query_as::<_, ParticipantRecord>(
            "SELECT id, username FROM users WHERE id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Participant::try_from).collect()
    }
}

// ---- 会话仓储 ----

pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 会话内消息标识，seq 列即提交顺序。
    async fn load_message_ids(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<MessageId>, RepositoryError> {
        let ids: Vec<(Uuid,)> =
            sqlx::query_as("SELECT id FROM messages WHERE conversation_id = $1 ORDER BY seq")
                .bind(conversation_id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

        Ok(ids.into_iter().map(|(id,)| MessageId::from(id)).collect())
    }

    async fn hydrate(
        &self,
        record: ConversationRecord,
    ) -> Result<Conversation, RepositoryError> {
        let message_ids = self.load_message_ids(record.id).await?;
        Ok(record.into_conversation(message_ids))
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn find_by_participants(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let (low, high) = normalized_pair(a, b);
        let record = sqlx::query_as::<_, ConversationRecord>(
            "SELECT id, participant_one, participant_two, created_at, updated_at \
             FROM conversations \
             WHERE LEAST(participant_one, participant_two) = $1 \
               AND GREATEST(participant_one, participant_two) = $2",
        )
        .bind(Uuid::from(low))
        .bind(Uuid::from(high))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match record {
            Some(record) => Ok(Some(self.hydrate(record).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            "SELECT id, participant_one, participant_two, created_at, updated_at \
             FROM conversations WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match record {
            Some(record) => Ok(Some(self.hydrate(record).await?)),
            None => Ok(None),
        }
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Conversation>, RepositoryError> {
        let records = sqlx::query_as::<_, ConversationRecord>(
            "SELECT id, participant_one, participant_two, created_at, updated_at \
             FROM conversations \
             WHERE participant_one = $1 OR participant_two = $1 \
             ORDER BY updated_at DESC",
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let mut conversations = Vec::with_capacity(records.len());
        for record in records {
            conversations.push(self.hydrate(record).await?);
        }
        Ok(conversations)
    }

    async fn create_with_first_message(
        &self,
        conversation: Conversation,
        message: Message,
    ) -> Result<Conversation, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        sqlx::query(
            "INSERT INTO conversations (id, participant_one, participant_two, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::from(conversation.id))
        .bind(Uuid::from(conversation.participants[0]))
        .bind(Uuid::from(conversation.participants[1]))
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, receiver_id, body, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(conversation.id))
        .bind(Uuid::from(message.sender_id))
        .bind(Uuid::from(message.receiver_id))
        .bind(message.body.as_str())
        .bind(message.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;

        let mut created = conversation;
        created.append_message(message.id, message.created_at);
        Ok(created)
    }

    async fn append_message(
        &self,
        conversation_id: ConversationId,
        message: Message,
        now: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, receiver_id, body, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(message.sender_id))
        .bind(Uuid::from(message.receiver_id))
        .bind(message.body.as_str())
        .bind(message.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let updated = sqlx::query("UPDATE conversations SET updated_at = $2 WHERE id = $1")
            .bind(Uuid::from(conversation_id))
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        if updated.rows_affected() == 0 {
            // 会话不存在，整个事务随 tx 的 drop 回滚
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await.map_err(map_sqlx_err)
    }
}

// ---- 消息仓储 ----

pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            "SELECT id, sender_id, receiver_id, body, created_at FROM messages WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            "SELECT id, sender_id, receiver_id, body, created_at \
             FROM messages WHERE conversation_id = $1 ORDER BY seq",
        )
        .bind(Uuid::from(conversation_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }

    async fn find_latest(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Message>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            "SELECT id, sender_id, receiver_id, body, created_at \
             FROM messages WHERE conversation_id = $1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(Uuid::from(conversation_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }
}
