//! Conversation store
//!
//! Owns the conversation list, the current conversation and its messages.
//! Every operation applies local changes first and merges the server's
//! answer when it arrives:
//! 1. User messages are appended before the request is sent
//! 2. Replies are merged into the conversation they were sent to
//! 3. Failures become notifications and never roll local changes back
//!
//! The state lock is never held across a gateway call, so a
//! [`ConversationStore::snapshot`] taken mid-request shows the optimistic state.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::api::{ApiError, Gateway};
use crate::conversation::{ChatSnapshot, Conversation, Message, MessageStatus, DEFAULT_TITLE};
use crate::storage::{self, KeyValueStore, StorageError, CHAT_SNAPSHOT_KEY};

use super::notify::Notifier;

/// Point-in-time view of the store for rendering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    /// Newest first
    pub conversations: Vec<Conversation>,
    pub current_id: Option<String>,
    /// Messages of the current conversation, in display order
    pub messages: Vec<Message>,
    pub loading: bool,
    /// Requests still waiting for an assistant reply
    pub in_flight: usize,
}

impl ChatState {
    pub fn current(&self) -> Option<&Conversation> {
        let id = self.current_id.as_deref()?;
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn is_sending(&self) -> bool {
        self.in_flight > 0
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.conversations.iter().position(|c| c.id == id)
    }

    fn is_current(&self, id: &str) -> bool {
        self.current_id.as_deref() == Some(id)
    }

    /// Record `message` on its conversation and move that conversation to the front
    fn touch(&mut self, message: &Message) {
        if let Some(index) = self.position(&message.conversation_id) {
            let mut conversation = self.conversations.remove(index);
            conversation.record_message(message);
            self.conversations.insert(0, conversation);
        }
    }

    fn set_status(&mut self, message_id: &str, status: MessageStatus) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) {
            message.status = status;
        }
    }
}

pub struct ConversationStore {
    gateway: Arc<dyn Gateway>,
    notifier: Notifier,
    state: RwLock<ChatState>,
}

impl ConversationStore {
    pub fn new(gateway: Arc<dyn Gateway>, notifier: Notifier) -> Self {
        Self {
            gateway,
            notifier,
            state: RwLock::new(ChatState::default()),
        }
    }

    pub async fn snapshot(&self) -> ChatState {
        self.state.read().await.clone()
    }

    pub async fn current(&self) -> Option<Conversation> {
        self.state.read().await.current().cloned()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.read().await.messages.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    pub async fn is_sending(&self) -> bool {
        self.state.read().await.is_sending()
    }

    async fn set_loading(&self, loading: bool) {
        self.state.write().await.loading = loading;
    }

    /// Refresh the conversation list from the server, newest first
    ///
    /// On failure the cached list is returned.
    pub async fn list_conversations(&self) -> Vec<Conversation> {
        self.set_loading(true).await;
        let result = self.gateway.list_conversations().await;

        let mut state = self.state.write().await;
        state.loading = false;
        match result {
            Ok(mut conversations) => {
                conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                state.conversations = conversations;

                let current_missing = state
                    .current_id
                    .as_deref()
                    .is_some_and(|id| state.position(id).is_none());
                if current_missing {
                    tracing::debug!("Current conversation no longer listed");
                    state.current_id = None;
                    state.messages.clear();
                }
            }
            Err(e) => {
                drop(state);
                self.notifier.error("Error", failure_message(&e, "Failed to load conversations"));
                return self.state.read().await.conversations.clone();
            }
        }
        state.conversations.clone()
    }

    /// Start a new conversation and make it current
    ///
    /// An empty current conversation is reused instead of creating another one.
    pub async fn create_conversation(&self) -> Result<Conversation, ApiError> {
        {
            let state = self.state.read().await;
            if state.messages.is_empty() {
                if let Some(current) = state.current() {
                    tracing::debug!("Reusing empty conversation {}", current.id);
                    return Ok(current.clone());
                }
            }
        }

        self.set_loading(true).await;
        let result = self.gateway.create_conversation(DEFAULT_TITLE).await;

        let mut state = self.state.write().await;
        state.loading = false;
        match result {
            Ok(conversation) => {
                state.conversations.retain(|c| c.id != conversation.id);
                state.conversations.insert(0, conversation.clone());
                state.current_id = Some(conversation.id.clone());
                state.messages.clear();
                tracing::debug!("Created conversation {}", conversation.id);
                Ok(conversation)
            }
            Err(e) => {
                drop(state);
                self.notifier
                    .error("Error", failure_message(&e, "Failed to create conversation"));
                Err(e)
            }
        }
    }

    /// Make `id` current and load its messages; unknown ids are ignored
    pub async fn select_conversation(&self, id: &str) {
        if self.state.read().await.position(id).is_none() {
            tracing::debug!("Ignoring selection of unknown conversation {}", id);
            return;
        }
        self.load_conversation(id).await;
    }

    async fn load_conversation(&self, id: &str) {
        self.set_loading(true).await;
        let result = self.gateway.get_conversation(id).await;

        let mut state = self.state.write().await;
        state.loading = false;
        match result {
            Ok(detail) => {
                // Deleted while the request was in flight
                let Some(index) = state.position(id) else {
                    tracing::debug!("Dropping detail of removed conversation {}", id);
                    return;
                };
                state.conversations[index] = detail.conversation;
                state.current_id = Some(id.to_string());
                state.messages = detail.messages;
            }
            Err(e) => {
                drop(state);
                self.notifier
                    .error("Error", failure_message(&e, "Failed to load conversation"));
            }
        }
    }

    /// Send a user message to the current conversation
    ///
    /// Creates a conversation first when none is current. Only empty content
    /// is reported to the caller; every other failure becomes a notification.
    pub async fn send_message(&self, content: &str) -> Result<(), ApiError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::Validation("Message content is required".to_string()));
        }

        let current_id = self.state.read().await.current_id.clone();
        let conversation_id = match current_id {
            Some(id) => id,
            None => match self.create_conversation().await {
                Ok(conversation) => conversation.id,
                Err(e) => {
                    tracing::error!("Failed to create conversation and send message: {}", e);
                    return Ok(());
                }
            },
        };

        self.send_to(&conversation_id, content).await;
        Ok(())
    }

    async fn send_to(&self, conversation_id: &str, content: &str) {
        let user_message = Message::pending_user(conversation_id, content);
        let user_message_id = user_message.id.clone();
        {
            let mut state = self.state.write().await;
            state.touch(&user_message);
            state.messages.push(user_message);
            state.in_flight += 1;
        }

        let result = self.gateway.send_message(conversation_id, content).await;

        let mut state = self.state.write().await;
        state.in_flight = state.in_flight.saturating_sub(1);
        match result {
            Ok(reply) => {
                state.set_status(&user_message_id, MessageStatus::Sent);
                if state.position(conversation_id).is_none() {
                    tracing::debug!("Dropping reply for removed conversation {}", conversation_id);
                    return;
                }
                state.touch(&reply);
                if state.is_current(conversation_id) {
                    state.messages.push(reply);
                } else {
                    tracing::debug!(
                        "Reply for {} arrived after switching conversations",
                        conversation_id
                    );
                }
            }
            Err(e) => {
                state.set_status(&user_message_id, MessageStatus::Failed);
                drop(state);
                self.notifier
                    .error("Error", failure_message(&e, "Failed to send message"));
            }
        }
    }

    /// Remove a conversation; the next one becomes current if it was selected
    pub async fn delete_conversation(&self, id: &str) {
        let next = {
            let mut state = self.state.write().await;
            let Some(index) = state.position(id) else {
                tracing::debug!("Ignoring deletion of unknown conversation {}", id);
                return;
            };
            state.conversations.remove(index);

            if state.is_current(id) {
                state.messages.clear();
                state.current_id = state.conversations.first().map(|c| c.id.clone());
                state.current_id.clone()
            } else {
                None
            }
        };

        if let Err(e) = self.gateway.delete_conversation(id).await {
            self.notifier
                .error("Error", failure_message(&e, "Failed to delete conversation"));
        }

        if let Some(next_id) = next {
            self.load_conversation(&next_id).await;
        }
    }

    /// Forget all conversations, e.g. on logout
    pub async fn reset(&self) {
        *self.state.write().await = ChatState::default();
    }

    pub async fn to_snapshot(&self) -> ChatSnapshot {
        let state = self.state.read().await;
        ChatSnapshot {
            conversations: state.conversations.clone(),
            current_id: state.current_id.clone(),
            messages: state.messages.clone(),
        }
    }

    /// Replace the store's contents with a snapshot
    ///
    /// A current id that is not in the snapshot's list is dropped along with
    /// its messages.
    pub async fn restore_snapshot(&self, snapshot: ChatSnapshot) {
        let mut state = self.state.write().await;
        let current_known = snapshot
            .current_id
            .as_deref()
            .is_some_and(|id| snapshot.conversations.iter().any(|c| c.id == id));

        state.conversations = snapshot.conversations;
        if current_known {
            state.current_id = snapshot.current_id;
            state.messages = snapshot.messages;
        } else {
            state.current_id = None;
            state.messages.clear();
        }
    }

    pub async fn save(&self, store: &dyn KeyValueStore) -> Result<(), StorageError> {
        let snapshot = self.to_snapshot().await;
        storage::save_json(store, CHAT_SNAPSHOT_KEY, &snapshot).await
    }

    /// Load the persisted snapshot; returns whether one was found
    pub async fn load(&self, store: &dyn KeyValueStore) -> Result<bool, StorageError> {
        match storage::load_json::<ChatSnapshot>(store, CHAT_SNAPSHOT_KEY).await? {
            Some(snapshot) => {
                self.restore_snapshot(snapshot).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn failure_message(err: &ApiError, fallback: &str) -> String {
    let message = err.to_string();
    if message.is_empty() {
        fallback.to_string()
    } else {
        format!("{}: {}", fallback, message)
    }
}
