//! Session state: who is logged in and with which token

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::api::{ApiError, AuthResponse, BearerToken, Credentials, Gateway};
use crate::conversation::User;
use crate::storage::{
    self, KeyValueStore, StorageError, AUTH_TOKEN_KEY, SESSION_EXPIRES_KEY, USER_KEY,
};

use super::notify::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Unauthenticated,
    Loading,
    Authenticated,
}

struct Session {
    user: Option<User>,
    status: AuthStatus,
}

#[derive(Clone, Copy)]
enum AuthFlow {
    Login,
    Signup,
}

pub struct AuthState {
    gateway: Arc<dyn Gateway>,
    storage: Arc<dyn KeyValueStore>,
    token: BearerToken,
    notifier: Notifier,
    session_ttl: Duration,
    session: RwLock<Session>,
}

impl AuthState {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        storage: Arc<dyn KeyValueStore>,
        token: BearerToken,
        notifier: Notifier,
        session_ttl: Duration,
    ) -> Self {
        Self {
            gateway,
            storage,
            token,
            notifier,
            session_ttl,
            session: RwLock::new(Session {
                user: None,
                status: AuthStatus::Unauthenticated,
            }),
        }
    }

    /// Resume a persisted session, if one is still valid
    ///
    /// No request is made: an unexpired token and a readable user are trusted.
    /// Anything else clears the persisted session.
    pub async fn restore(&self) -> AuthStatus {
        match self.read_persisted().await {
            Ok(Some((user, token))) => {
                tracing::debug!("Restored session for {}", user.username);
                self.token.set(token).await;
                let mut session = self.session.write().await;
                session.user = Some(user);
                session.status = AuthStatus::Authenticated;
                AuthStatus::Authenticated
            }
            Ok(None) => {
                self.clear_persisted().await;
                AuthStatus::Unauthenticated
            }
            Err(e) => {
                tracing::warn!("Discarding unreadable session: {}", e);
                self.clear_persisted().await;
                AuthStatus::Unauthenticated
            }
        }
    }

    async fn read_persisted(&self) -> Result<Option<(User, String)>, StorageError> {
        let store = self.storage.as_ref();
        let Some(token) = store.get(AUTH_TOKEN_KEY).await? else {
            return Ok(None);
        };
        let Some(user) = storage::load_json::<User>(store, USER_KEY).await? else {
            return Ok(None);
        };

        if let Some(raw) = store.get(SESSION_EXPIRES_KEY).await? {
            match DateTime::parse_from_rfc3339(&raw) {
                Ok(expires_at) if expires_at.with_timezone(&Utc) > Utc::now() => {}
                Ok(_) => {
                    tracing::debug!("Persisted session for {} has expired", user.username);
                    return Ok(None);
                }
                Err(e) => {
                    tracing::warn!("Invalid session expiry {:?}: {}", raw, e);
                    return Ok(None);
                }
            }
        }

        Ok(Some((user, token)))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<User, ApiError> {
        self.authenticate(AuthFlow::Login, Credentials::new(username, password))
            .await
    }

    pub async fn signup(&self, username: &str, password: &str) -> Result<User, ApiError> {
        self.authenticate(AuthFlow::Signup, Credentials::new(username, password))
            .await
    }

    async fn authenticate(
        &self,
        flow: AuthFlow,
        credentials: Credentials,
    ) -> Result<User, ApiError> {
        let failure_title = match flow {
            AuthFlow::Login => "Login failed",
            AuthFlow::Signup => "Signup failed",
        };

        let checked = match flow {
            AuthFlow::Login => credentials.validate(),
            AuthFlow::Signup => credentials.validate_new(),
        };
        if let Err(e) = checked {
            self.notifier.error(failure_title, e.to_string());
            return Err(e);
        }

        let previous = self.set_status(AuthStatus::Loading).await;

        let result = match flow {
            AuthFlow::Login => self.gateway.login(&credentials).await,
            AuthFlow::Signup => self.gateway.signup(&credentials).await,
        };

        match result {
            Ok(AuthResponse { user, token }) => {
                self.persist(&user, &token).await;
                self.token.set(token).await;
                {
                    let mut session = self.session.write().await;
                    session.user = Some(user.clone());
                    session.status = AuthStatus::Authenticated;
                }

                match flow {
                    AuthFlow::Login => self.notifier.info(
                        "Login successful",
                        format!("Welcome back, {}!", user.username),
                    ),
                    AuthFlow::Signup => self
                        .notifier
                        .info("Signup successful", format!("Welcome, {}!", user.username)),
                }
                Ok(user)
            }
            Err(e) => {
                self.set_status(previous).await;
                self.notifier.error(failure_title, e.to_string());
                Err(e)
            }
        }
    }

    /// Forget the session; always succeeds
    pub async fn logout(&self) {
        self.clear_persisted().await;
        self.token.clear().await;
        {
            let mut session = self.session.write().await;
            session.user = None;
            session.status = AuthStatus::Unauthenticated;
        }
        self.notifier
            .info("Logged out", "You have been successfully logged out");
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.user.is_some()
    }

    pub async fn user(&self) -> Option<User> {
        self.session.read().await.user.clone()
    }

    pub async fn status(&self) -> AuthStatus {
        self.session.read().await.status
    }

    pub async fn token(&self) -> Option<String> {
        self.token.get().await
    }

    /// Returns the status that was replaced
    async fn set_status(&self, status: AuthStatus) -> AuthStatus {
        std::mem::replace(&mut self.session.write().await.status, status)
    }

    async fn persist(&self, user: &User, token: &str) {
        let store = self.storage.as_ref();
        let expires_at = (Utc::now() + self.session_ttl).to_rfc3339();

        let result = async {
            store.set(AUTH_TOKEN_KEY, token).await?;
            storage::save_json(store, USER_KEY, user).await?;
            store.set(SESSION_EXPIRES_KEY, &expires_at).await
        }
        .await;

        // The in-memory session stays valid; it just won't survive a restart
        if let Err(e) = result {
            tracing::warn!("Failed to persist session: {}", e);
        }
    }

    async fn clear_persisted(&self) {
        for key in [AUTH_TOKEN_KEY, USER_KEY, SESSION_EXPIRES_KEY] {
            if let Err(e) = self.storage.remove(key).await {
                tracing::warn!("Failed to remove {} from storage: {}", key, e);
            }
        }
    }
}
