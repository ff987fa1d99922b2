//! In-process mock backend
//!
//! Behaves like the real chat backend: it validates credentials, issues
//! fake tokens, keeps conversations and messages in memory and answers with
//! a canned reply. Tests can inject failures and hold replies back to
//! observe optimistic updates.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::conversation::{Conversation, Message, Role, User};

use super::{ApiError, ApiResult, AuthResponse, ConversationDetail, Credentials, Gateway};

const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// Produces the assistant reply for a user message
pub type Responder = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Calls that can be held back until a gate is notified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hold {
    /// `login` and `signup`, after credential validation
    Auth,
    /// `get_conversation`, after the detail has been read
    Detail,
    /// `send_message`, after the user turn has been recorded
    Reply,
}

struct Account {
    user: User,
    password: String,
}

#[derive(Default)]
struct MockState {
    accounts: HashMap<String, Account>,
    conversations: Vec<Conversation>,
    messages: HashMap<String, Vec<Message>>,
    failures: VecDeque<ApiError>,
}

pub struct MockGateway {
    state: Mutex<MockState>,
    responder: Responder,
    latency: Duration,
    gates: HashMap<Hold, Arc<Notify>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            responder: Arc::new(|content: &str| {
                format!("This is a sample response to: {}", content)
            }),
            latency: Duration::ZERO,
            gates: HashMap::new(),
        }
    }

    /// A backend pre-seeded with a few finished conversations
    pub fn with_demo_data() -> Self {
        let gateway = Self::new();
        let now = Utc::now();
        let seeds = [
            (
                "conv_1",
                "About AI ethics",
                2,
                "What are the main ethical concerns with AI development?",
                "Privacy, bias, transparency, accountability and the impact on jobs.",
            ),
            (
                "conv_2",
                "Learning JavaScript",
                1,
                "What's the best way to learn JavaScript?",
                "Start with the fundamentals, build small projects and practice regularly.",
            ),
            (
                "conv_3",
                "Travel recommendations",
                0,
                "What are the best places to visit in Europe for a summer vacation?",
                "The Greek islands, the Amalfi Coast and Scandinavia in summer.",
            ),
        ];

        let mut state = MockState::default();
        for (id, title, days_ago, question, answer) in seeds {
            let at = now - chrono::Duration::days(days_ago);
            let mut conversation = Conversation::new(id, title);
            conversation.created_at = at;
            conversation.updated_at = at;

            let mut user = Message::new(id, Role::User, question);
            user.created_at = at;
            let mut assistant = Message::new(id, Role::Assistant, answer);
            assistant.created_at = at;
            conversation.last_message = Some(answer.to_string());

            state.conversations.push(conversation);
            state.messages.insert(id.to_string(), vec![user, assistant]);
        }

        Self {
            state: Mutex::new(state),
            ..gateway
        }
    }

    pub fn with_responder(
        mut self,
        responder: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.responder = Arc::new(responder);
        self
    }

    /// Delay every call, like a real network round trip
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Hold every call of the given kind until the gate is notified
    pub fn with_gate(mut self, hold: Hold, gate: Arc<Notify>) -> Self {
        self.gates.insert(hold, gate);
        self
    }

    /// Make the next call (of any kind) fail with `error`
    pub async fn fail_next(&self, error: ApiError) {
        self.state.lock().await.failures.push_back(error);
    }

    /// Messages the backend has recorded for a conversation
    pub async fn stored_messages(&self, conversation_id: &str) -> Vec<Message> {
        self.state
            .lock()
            .await
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn simulate(&self) -> ApiResult<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.state.lock().await.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn wait(&self, hold: Hold) {
        if let Some(gate) = self.gates.get(&hold) {
            gate.notified().await;
        }
    }

    fn issue(user: User) -> AuthResponse {
        AuthResponse {
            user,
            token: format!("fake_token_{}", Uuid::new_v4().simple()),
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found() -> ApiError {
    ApiError::Network {
        status: Some(404),
        message: "Conversation not found".to_string(),
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn login(&self, credentials: &Credentials) -> ApiResult<AuthResponse> {
        self.simulate().await?;
        credentials.validate()?;
        self.wait(Hold::Auth).await;

        let state = self.state.lock().await;
        if let Some(account) = state.accounts.get(&credentials.username) {
            if account.password != credentials.password {
                return Err(ApiError::Auth(INVALID_CREDENTIALS.to_string()));
            }
            return Ok(Self::issue(account.user.clone()));
        }

        if credentials.password.chars().count() < super::MIN_PASSWORD_LEN {
            return Err(ApiError::Auth(INVALID_CREDENTIALS.to_string()));
        }

        Ok(Self::issue(User {
            id: format!("user_{}", Uuid::new_v4().simple()),
            username: credentials.username.clone(),
        }))
    }

    async fn signup(&self, credentials: &Credentials) -> ApiResult<AuthResponse> {
        self.simulate().await?;
        credentials.validate_new()?;
        self.wait(Hold::Auth).await;

        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&credentials.username) {
            return Err(ApiError::Validation("Username already exists".to_string()));
        }

        let user = User {
            id: format!("user_{}", Uuid::new_v4().simple()),
            username: credentials.username.clone(),
        };
        state.accounts.insert(
            credentials.username.clone(),
            Account {
                user: user.clone(),
                password: credentials.password.clone(),
            },
        );
        Ok(Self::issue(user))
    }

    async fn list_conversations(&self) -> ApiResult<Vec<Conversation>> {
        self.simulate().await?;
        let mut conversations = self.state.lock().await.conversations.clone();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn create_conversation(&self, title: &str) -> ApiResult<Conversation> {
        self.simulate().await?;
        let conversation = Conversation::new(format!("conv_{}", Uuid::new_v4().simple()), title);

        let mut state = self.state.lock().await;
        state.conversations.push(conversation.clone());
        state.messages.insert(conversation.id.clone(), Vec::new());
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &str) -> ApiResult<ConversationDetail> {
        self.simulate().await?;
        let detail = {
            let state = self.state.lock().await;
            let conversation = state
                .conversations
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(not_found)?;
            ConversationDetail {
                messages: state.messages.get(id).cloned().unwrap_or_default(),
                conversation,
            }
        };

        self.wait(Hold::Detail).await;
        Ok(detail)
    }

    async fn send_message(&self, conversation_id: &str, content: &str) -> ApiResult<Message> {
        self.simulate().await?;
        if content.trim().is_empty() {
            return Err(ApiError::Validation("Message content is required".to_string()));
        }

        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let conversation = state
                .conversations
                .iter_mut()
                .find(|c| c.id == conversation_id)
                .ok_or_else(not_found)?;

            let user_message = Message::new(conversation_id, Role::User, content);
            conversation.record_message(&user_message);
            state
                .messages
                .entry(conversation_id.to_string())
                .or_default()
                .push(user_message);
        }

        self.wait(Hold::Reply).await;

        let reply = Message::new(conversation_id, Role::Assistant, (self.responder)(content));

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if let Some(conversation) = state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            conversation.record_message(&reply);
            state
                .messages
                .entry(conversation_id.to_string())
                .or_default()
                .push(reply.clone());
        }
        Ok(reply)
    }

    async fn delete_conversation(&self, id: &str) -> ApiResult<()> {
        self.simulate().await?;
        let mut state = self.state.lock().await;
        let before = state.conversations.len();
        state.conversations.retain(|c| c.id != id);
        if state.conversations.len() == before {
            return Err(not_found());
        }
        state.messages.remove(id);
        Ok(())
    }
}
