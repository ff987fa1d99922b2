//! Application state: the session and the conversations, wired together

use std::sync::Arc;

use crate::api::{self, BearerToken, Gateway};
use crate::config::{Config, StorageKind};
use crate::core::{AuthState, AuthStatus, ConversationStore, Notifier};
use crate::storage::{KeyValueStore, MemoryStorage, SqliteStorage, StorageError, CHAT_SNAPSHOT_KEY};

pub struct App {
    pub config: Config,
    pub auth: AuthState,
    pub chat: ConversationStore,
    storage: Arc<dyn KeyValueStore>,
}

impl App {
    /// Build every component from the configuration and resume a saved session
    pub async fn init(config: Config, notifier: Notifier) -> Result<Self, StorageError> {
        let storage: Arc<dyn KeyValueStore> = match config.storage {
            StorageKind::Sqlite => Arc::new(SqliteStorage::new(&config.database_path()).await?),
            StorageKind::Memory => Arc::new(MemoryStorage::new()),
        };
        let token = BearerToken::new();
        let gateway = api::gateway_from_config(&config, token.clone());

        let app = Self::from_parts(config, gateway, storage, token, notifier);
        app.start().await;
        Ok(app)
    }

    /// Assemble an app from explicit collaborators
    ///
    /// `token` must be the same handle the gateway reads its bearer token from.
    pub fn from_parts(
        config: Config,
        gateway: Arc<dyn Gateway>,
        storage: Arc<dyn KeyValueStore>,
        token: BearerToken,
        notifier: Notifier,
    ) -> Self {
        let auth = AuthState::new(
            gateway.clone(),
            storage.clone(),
            token,
            notifier.clone(),
            config.session_ttl(),
        );
        let chat = ConversationStore::new(gateway, notifier);
        Self {
            config,
            auth,
            chat,
            storage,
        }
    }

    /// Restore the session and, if enabled, the last saved conversations
    pub async fn start(&self) -> AuthStatus {
        let status = self.auth.restore().await;
        if status == AuthStatus::Authenticated && self.config.persist_chat {
            match self.chat.load(self.storage.as_ref()).await {
                Ok(true) => tracing::debug!("Restored saved conversations"),
                Ok(false) => {}
                Err(e) => tracing::warn!("Ignoring unreadable chat snapshot: {}", e),
            }
        }
        status
    }

    /// End the session and forget its conversations
    pub async fn logout(&self) {
        self.auth.logout().await;
        self.chat.reset().await;
        if let Err(e) = self.storage.remove(CHAT_SNAPSHOT_KEY).await {
            tracing::warn!("Failed to remove chat snapshot: {}", e);
        }
    }

    pub async fn shutdown(&self) -> Result<(), StorageError> {
        if self.config.persist_chat && self.auth.is_authenticated().await {
            self.chat.save(self.storage.as_ref()).await?;
            tracing::debug!("Saved conversations");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockGateway;
    use crate::conversation::Role;

    fn app_with(storage: Arc<MemoryStorage>, persist_chat: bool) -> App {
        let (notifier, _rx) = Notifier::channel();
        let config = Config {
            persist_chat,
            ..Config::default()
        };
        App::from_parts(
            config,
            Arc::new(MockGateway::new()),
            storage,
            BearerToken::new(),
            notifier,
        )
    }

    #[tokio::test]
    async fn test_two_plus_two_scenario() {
        let app = app_with(Arc::new(MemoryStorage::new()), false);
        app.auth.signup("alice", "secret1").await.unwrap();

        app.chat.send_message("2+2?").await.unwrap();

        let state = app.chat.snapshot().await;
        assert_eq!(state.conversations.len(), 1);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].role, Role::User);
        assert_eq!(state.messages[1].role, Role::Assistant);
        assert_eq!(state.current_id.as_deref(), Some(state.conversations[0].id.as_str()));
    }

    #[tokio::test]
    async fn test_logout_resets_conversations() {
        let app = app_with(Arc::new(MemoryStorage::new()), false);
        app.auth.login("alice", "secret1").await.unwrap();
        app.chat.send_message("hello").await.unwrap();

        app.logout().await;

        assert!(!app.auth.is_authenticated().await);
        let state = app.chat.snapshot().await;
        assert!(state.conversations.is_empty());
        assert!(state.current_id.is_none());
    }

    #[tokio::test]
    async fn test_persisted_chat_survives_restart() {
        let storage = Arc::new(MemoryStorage::new());

        let first = app_with(storage.clone(), true);
        first.auth.login("alice", "secret1").await.unwrap();
        first.chat.send_message("remember me").await.unwrap();
        first.shutdown().await.unwrap();

        let second = app_with(storage, true);
        assert_eq!(second.start().await, AuthStatus::Authenticated);
        assert_eq!(
            second.chat.to_snapshot().await,
            first.chat.to_snapshot().await
        );
    }

    #[tokio::test]
    async fn test_chat_is_not_persisted_by_default() {
        let storage = Arc::new(MemoryStorage::new());

        let first = app_with(storage.clone(), false);
        first.auth.login("alice", "secret1").await.unwrap();
        first.chat.send_message("ephemeral").await.unwrap();
        first.shutdown().await.unwrap();

        assert!(storage.get(CHAT_SNAPSHOT_KEY).await.unwrap().is_none());
    }
}
