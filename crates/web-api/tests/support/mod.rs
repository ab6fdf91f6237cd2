//! 测试夹具：内存仓储 + 记录型广播器，完全不依赖外部服务。

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use uuid::Uuid;

use application::repository::{ConversationRepository, MessageRepository, UserRepository};
use application::services::MessageService;
use application::{
    BroadcastError, EventBroadcaster, PresenceRegistry, ServerEvent, SystemClock,
};
use domain::{
    Conversation, ConversationId, Message, MessageId, Participant, PasswordHash, RepositoryError,
    Timestamp, User, UserEmail, UserId, Username,
};
use web_api::{router, AppState, JwtConfig, JwtService};

pub const TEST_SECRET: &str = "integration-test-secret-of-32-chars!!";

#[derive(Default)]
pub struct InMemoryUsers {
    users: Mutex<Vec<User>>,
}

impl InMemoryUsers {
    pub fn insert(&self, id: UserId, name: &str) {
        let now = Utc::now();
        self.users.lock().unwrap().push(User {
            id,
            username: Username::parse(name).unwrap(),
            email: UserEmail::parse(format!("{name}@example.com")).unwrap(),
            password: PasswordHash::new("$2b$10$hash").unwrap(),
            created_at: now,
            updated_at: now,
        });
    }
}

#[async_trait]
impl UserRepository for InMemoryUsers {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn find_profiles(&self, ids: &[UserId]) -> Result<Vec<Participant>, RepositoryError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| ids.contains(&u.id))
            .map(Participant::from)
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    pub conversations: Mutex<Vec<Conversation>>,
    pub messages: Mutex<Vec<Message>>,
}

#[async_trait]
impl ConversationRepository for InMemoryStore {
    async fn find_by_participants(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let key = domain::normalized_pair(a, b);
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.participant_pair() == key)
            .cloned())
    }

    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Conversation>, RepositoryError> {
        let mut found: Vec<Conversation> = self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.involves(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(found)
    }

    async fn create_with_first_message(
        &self,
        conversation: Conversation,
        message: Message,
    ) -> Result<Conversation, RepositoryError> {
        let key = conversation.participant_pair();
        let mut conversations = self.conversations.lock().unwrap();
        if conversations.iter().any(|c| c.participant_pair() == key) {
            return Err(RepositoryError::Conflict);
        }
        let mut created = conversation;
        created.append_message(message.id, message.created_at);
        conversations.push(created.clone());
        self.messages.lock().unwrap().push(message);
        Ok(created)
    }

    async fn append_message(
        &self,
        conversation_id: ConversationId,
        message: Message,
        now: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.lock().unwrap();
        let conversation = conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or(RepositoryError::NotFound)?;
        conversation.append_message(message.id, now);
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for InMemoryStore {
    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        Ok(self.messages.lock().unwrap().iter().find(|m| m.id == id).cloned())
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let conversations = self.conversations.lock().unwrap();
        let Some(conversation) = conversations.iter().find(|c| c.id == conversation_id) else {
            return Ok(Vec::new());
        };
        let messages = self.messages.lock().unwrap();
        Ok(conversation
            .message_ids
            .iter()
            .filter_map(|id| messages.iter().find(|m| m.id == *id).cloned())
            .collect())
    }

    async fn find_latest(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Message>, RepositoryError> {
        Ok(self
            .list_by_conversation(conversation_id)
            .await?
            .into_iter()
            .last())
    }
}

/// 记录扇出事件而不依赖真实连接。
#[derive(Default)]
pub struct RecordingBroadcaster {
    pub events: Mutex<Vec<(Vec<UserId>, ServerEvent)>>,
}

#[async_trait]
impl EventBroadcaster for RecordingBroadcaster {
    async fn broadcast_to(
        &self,
        recipients: &[UserId],
        event: ServerEvent,
    ) -> Result<(), BroadcastError> {
        self.events.lock().unwrap().push((recipients.to_vec(), event));
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub jwt: JwtService,
    pub broadcaster: Arc<RecordingBroadcaster>,
    pub alice: UserId,
    pub bob: UserId,
}

pub fn build_app() -> TestApp {
    let alice = UserId::from(Uuid::new_v4());
    let bob = UserId::from(Uuid::new_v4());

    let users = Arc::new(InMemoryUsers::default());
    users.insert(alice, "alice");
    users.insert(bob, "bob");

    let store = Arc::new(InMemoryStore::default());
    let broadcaster = Arc::new(RecordingBroadcaster::default());

    let message_service = Arc::new(MessageService::new(
        store.clone(),
        store,
        users,
        Arc::new(SystemClock),
        broadcaster.clone(),
    ));

    let jwt = JwtService::new(JwtConfig {
        secret: TEST_SECRET.to_string(),
        expiration_hours: 24,
    });
    let presence = Arc::new(PresenceRegistry::new());

    let state = AppState::new(message_service, presence, jwt.clone());
    TestApp {
        router: router(state),
        jwt,
        broadcaster,
        alice,
        bob,
    }
}
