//! Client state
//!
//! The session ([`AuthState`]) and the conversations ([`ConversationStore`]),
//! plus the notifications both emit.

mod auth;
mod chat;
pub mod notify;

pub use auth::{AuthState, AuthStatus};
pub use chat::{ChatState, ConversationStore};
pub use notify::{Notification, Notifier, Severity};
