//! Conversation types shared by the gateway, the stores and storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to conversations before their first user message
pub const DEFAULT_TITLE: &str = "New Conversation";

/// Prefix of client-generated message ids
pub const TEMP_ID_PREFIX: &str = "temp_";

/// Number of characters of the first message kept as the conversation title
const TITLE_PREVIEW_CHARS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Delivery state of a message
///
/// Only optimistic user messages ever leave `Sent`: they start `Pending`
/// and settle on `Sent` or `Failed` once the request completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    #[default]
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: None,
            title: title.into(),
            created_at: now,
            updated_at: now,
            last_message: None,
        }
    }

    /// Apply the side effects of a new message to this conversation
    pub fn record_message(&mut self, message: &Message) {
        if message.role == Role::User && self.title == DEFAULT_TITLE {
            self.title = derive_title(&message.content);
        }
        self.last_message = Some(message.content.clone());
        if message.created_at > self.updated_at {
            self.updated_at = message.created_at;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub content: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: MessageStatus,
}

impl Message {
    /// A user message created locally before the server has seen it
    pub fn pending_user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4().simple()),
            conversation_id: conversation_id.into(),
            content: content.into(),
            role: Role::User,
            created_at: Utc::now(),
            status: MessageStatus::Pending,
        }
    }

    pub fn new(conversation_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: format!("msg_{}", Uuid::new_v4().simple()),
            conversation_id: conversation_id.into(),
            content: content.into(),
            role,
            created_at: Utc::now(),
            status: MessageStatus::Sent,
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }
}

/// Serializable image of the conversation store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub current_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Title derived from the first user message: its first 30 characters,
/// with an ellipsis when truncated
pub fn derive_title(content: &str) -> String {
    let content = content.trim();
    let mut chars = content.chars();
    let preview: String = chars.by_ref().take(TITLE_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}
