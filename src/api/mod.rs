//! Chat API gateway
//!
//! Every call into the remote service goes through the [`Gateway`] trait.
//! Two implementations exist: [`HttpGateway`] talks to the real backend and
//! [`MockGateway`] keeps an in-process backend for tests and offline demos.
//! Both report failures as [`ApiError`].

mod http;
mod mock;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::{Config, GatewayKind};
use crate::conversation::{Conversation, Message, User};

pub use http::HttpGateway;
pub use mock::{Hold, MockGateway, Responder};

/// Uniform failure shape for every client operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Input rejected before or by the server (empty credentials, short password, empty message)
    #[error("{0}")]
    Validation(String),

    /// Credentials or session rejected
    #[error("{0}")]
    Auth(String),

    /// Transport failure or non-2xx response
    #[error("{message}")]
    Network { status: Option<u16>, message: String },
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        ApiError::Network {
            status: None,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Network { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Shortest password accepted at signup
pub const MIN_PASSWORD_LEN: usize = 6;

/// Login/signup request body
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both fields must be present
    pub fn validate(&self) -> ApiResult<()> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(ApiError::Validation(
                "Username and password are required".to_string(),
            ));
        }
        Ok(())
    }

    /// Rules for creating an account
    pub fn validate_new(&self) -> ApiResult<()> {
        self.validate()?;
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Session token shared between the auth state (writer) and the HTTP gateway (reader)
#[derive(Debug, Clone, Default)]
pub struct BearerToken(Arc<RwLock<Option<String>>>);

impl BearerToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<String> {
        self.0.read().await.clone()
    }

    pub async fn set(&self, token: impl Into<String>) {
        *self.0.write().await = Some(token.into());
    }

    pub async fn clear(&self) {
        *self.0.write().await = None;
    }
}

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> ApiResult<AuthResponse>;

    async fn signup(&self, credentials: &Credentials) -> ApiResult<AuthResponse>;

    async fn list_conversations(&self) -> ApiResult<Vec<Conversation>>;

    async fn create_conversation(&self, title: &str) -> ApiResult<Conversation>;

    async fn get_conversation(&self, id: &str) -> ApiResult<ConversationDetail>;

    /// Post a user message and return the assistant's reply
    async fn send_message(&self, conversation_id: &str, content: &str) -> ApiResult<Message>;

    async fn delete_conversation(&self, id: &str) -> ApiResult<()>;
}

/// Build the gateway selected by the configuration
pub fn gateway_from_config(config: &Config, token: BearerToken) -> Arc<dyn Gateway> {
    match config.gateway {
        GatewayKind::Http => {
            tracing::debug!("Using HTTP gateway at {}", config.api_url);
            Arc::new(HttpGateway::new(config.api_url.clone(), token))
        }
        GatewayKind::Mock => {
            tracing::debug!("Using in-process mock gateway");
            Arc::new(
                MockGateway::with_demo_data()
                    .with_latency(Duration::from_millis(config.mock_latency_ms)),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_is_the_message() {
        let err = ApiError::Network {
            status: Some(500),
            message: "Internal error".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error");
        assert_eq!(err.status(), Some(500));
        assert_eq!(ApiError::Auth("nope".into()).status(), None);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("alice", "hunter22");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter22"));
    }

    #[test]
    fn test_credential_validation() {
        assert!(Credentials::new("", "secret1").validate().is_err());
        assert!(Credentials::new("   ", "secret1").validate().is_err());
        assert!(Credentials::new("alice", "").validate().is_err());
        assert!(Credentials::new("alice", "x").validate().is_ok());

        assert_eq!(
            Credentials::new("alice", "12345").validate_new(),
            Err(ApiError::Validation(
                "Password must be at least 6 characters".to_string()
            ))
        );
        assert!(Credentials::new("alice", "123456").validate_new().is_ok());
    }

    #[tokio::test]
    async fn test_bearer_token_is_shared_between_clones() {
        let token = BearerToken::new();
        let reader = token.clone();

        token.set("abc").await;
        assert_eq!(reader.get().await.as_deref(), Some("abc"));

        token.clear().await;
        assert!(reader.get().await.is_none());
    }
}
