//! HTTP gateway for the chat backend

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::conversation::{Conversation, Message};

use super::{
    ApiError, ApiResult, AuthResponse, BearerToken, ConversationDetail, Credentials, Gateway,
};

const FALLBACK_ERROR: &str = "Something went wrong";

pub struct HttpGateway {
    client: Client,
    base_url: String,
    token: BearerToken,
}

#[derive(Debug, Serialize)]
struct CreateConversationRequest<'a> {
    title: &'a str,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, token: BearerToken) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.get().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send the request and map any non-2xx status to an [`ApiError`]
    async fn dispatch(&self, request: RequestBuilder) -> ApiResult<Response> {
        let response = self.authorize(request).await.send().await.map_err(|e| {
            tracing::warn!("API request failed: {}", e);
            ApiError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = error_for_status(status, &body);
        tracing::warn!("API error {}: {}", status, err);
        Err(err)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = self.dispatch(request).await?;
        response.json::<T>().await.map_err(|e| {
            tracing::warn!("Invalid API response: {}", e);
            ApiError::from(e)
        })
    }
}

/// Translate a non-2xx response into the uniform error shape
fn error_for_status(status: StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("{} ({})", FALLBACK_ERROR, status.as_u16()));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Auth(message),
        _ => ApiError::Network {
            status: Some(status.as_u16()),
            message,
        },
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn login(&self, credentials: &Credentials) -> ApiResult<AuthResponse> {
        tracing::debug!("POST /auth/login for {}", credentials.username);
        self.fetch(self.client.post(self.url("/auth/login")).json(credentials))
            .await
    }

    async fn signup(&self, credentials: &Credentials) -> ApiResult<AuthResponse> {
        tracing::debug!("POST /auth/signup for {}", credentials.username);
        self.fetch(self.client.post(self.url("/auth/signup")).json(credentials))
            .await
    }

    async fn list_conversations(&self) -> ApiResult<Vec<Conversation>> {
        tracing::debug!("GET /conversations");
        self.fetch(self.client.get(self.url("/conversations"))).await
    }

    async fn create_conversation(&self, title: &str) -> ApiResult<Conversation> {
        tracing::debug!("POST /conversations");
        self.fetch(
            self.client
                .post(self.url("/conversations"))
                .json(&CreateConversationRequest { title }),
        )
        .await
    }

    async fn get_conversation(&self, id: &str) -> ApiResult<ConversationDetail> {
        tracing::debug!("GET /conversations/{}", id);
        self.fetch(self.client.get(self.url(&format!("/conversations/{}", id))))
            .await
    }

    async fn send_message(&self, conversation_id: &str, content: &str) -> ApiResult<Message> {
        tracing::debug!("POST /conversations/{}/messages", conversation_id);
        self.fetch(
            self.client
                .post(self.url(&format!("/conversations/{}/messages", conversation_id)))
                .json(&SendMessageRequest { content }),
        )
        .await
    }

    async fn delete_conversation(&self, id: &str) -> ApiResult<()> {
        tracing::debug!("DELETE /conversations/{}", id);
        self.dispatch(self.client.delete(self.url(&format!("/conversations/{}", id))))
            .await?;
        Ok(())
    }
}
