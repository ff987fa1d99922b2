//! Integration tests for the HTTP gateway
//!
//! Runs a stub chat backend on a random local port and drives the gateway
//! (and the full app) against it.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use chatter::api::{ApiError, BearerToken, Credentials, Gateway, HttpGateway};
use chatter::conversation::Role;
use chatter::core::Notifier;
use chatter::storage::MemoryStorage;
use chatter::{App, Config};

const TOKEN: &str = "tok_alice";

#[derive(Clone, Default)]
struct Backend {
    /// Authorization headers seen by the server, in request order
    seen_auth: Arc<Mutex<Vec<Option<String>>>>,
}

impl Backend {
    fn record(&self, headers: &HeaderMap) -> bool {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let expected = format!("Bearer {}", TOKEN);
        let authorized = auth.as_deref() == Some(expected.as_str());
        self.seen_auth.lock().unwrap().push(auth);
        authorized
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Missing or invalid token" })),
    )
        .into_response()
}

fn conversation(id: &str, title: &str, updated_at: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "createdAt": "2024-05-01T09:00:00Z",
        "updatedAt": updated_at,
    })
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["password"] == "secret1" {
        Json(json!({
            "user": { "id": "user_1", "username": body["username"] },
            "token": TOKEN,
        }))
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid credentials" })),
        )
            .into_response()
    }
}

async fn list(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    if !backend.record(&headers) {
        return unauthorized();
    }
    Json(json!([
        conversation("conv_old", "Older", "2024-05-01T10:00:00Z"),
        conversation("conv_new", "Newer", "2024-05-02T10:00:00Z"),
    ]))
    .into_response()
}

async fn create(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !backend.record(&headers) {
        return unauthorized();
    }
    let title = body["title"].as_str().unwrap_or_default();
    (
        StatusCode::CREATED,
        Json(conversation("conv_http", title, "2024-05-03T10:00:00Z")),
    )
        .into_response()
}

async fn detail(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !backend.record(&headers) {
        return unauthorized();
    }
    match id.as_str() {
        "conv_new" => Json(json!({
            "conversation": conversation("conv_new", "Newer", "2024-05-02T10:00:00Z"),
            "messages": [{
                "id": "msg_1",
                "conversationId": "conv_new",
                "content": "Hi",
                "role": "user",
                "createdAt": "2024-05-02T10:00:00Z",
            }],
        }))
        .into_response(),
        "conv_broken" => (StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>").into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Conversation not found" })),
        )
            .into_response(),
    }
}

async fn reply(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if !backend.record(&headers) {
        return unauthorized();
    }
    let content = body["content"].as_str().unwrap_or_default();
    Json(json!({
        "id": "msg_reply",
        "conversationId": id,
        "content": format!("You said: {}", content),
        "role": "assistant",
        "createdAt": "2024-05-03T10:00:01Z",
    }))
    .into_response()
}

async fn remove(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    if !backend.record(&headers) {
        return unauthorized();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn spawn_backend() -> (String, Backend) {
    let backend = Backend::default();
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/conversations", get(list).post(create))
        .route("/api/conversations/:id", get(detail).delete(remove))
        .route("/api/conversations/:id/messages", post(reply))
        .layer(TraceLayer::new_for_http())
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/api", addr), backend)
}

#[tokio::test]
async fn test_login_and_bearer_header() {
    let (url, backend) = spawn_backend().await;
    let token = BearerToken::new();
    let gateway = HttpGateway::new(url, token.clone());

    let auth = gateway
        .login(&Credentials::new("alice", "secret1"))
        .await
        .unwrap();
    assert_eq!(auth.user.username, "alice");
    assert_eq!(auth.token, TOKEN);

    // Without a token the server refuses
    let err = gateway.list_conversations().await.unwrap_err();
    assert_eq!(err, ApiError::Auth("Missing or invalid token".to_string()));

    token.set(auth.token).await;
    let conversations = gateway.list_conversations().await.unwrap();
    assert_eq!(conversations.len(), 2);

    let seen = backend.seen_auth.lock().unwrap().clone();
    assert_eq!(seen, vec![None, Some(format!("Bearer {}", TOKEN))]);
}

#[tokio::test]
async fn test_rejected_login_is_auth_error() {
    let (url, _backend) = spawn_backend().await;
    let gateway = HttpGateway::new(url, BearerToken::new());

    let err = gateway
        .login(&Credentials::new("alice", "wrong-password"))
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::Auth("Invalid credentials".to_string()));
}

#[tokio::test]
async fn test_error_statuses_are_normalized() {
    let (url, _backend) = spawn_backend().await;
    let token = BearerToken::new();
    token.set(TOKEN).await;
    let gateway = HttpGateway::new(url, token);

    let missing = gateway.get_conversation("conv_missing").await.unwrap_err();
    assert_eq!(
        missing,
        ApiError::Network {
            status: Some(404),
            message: "Conversation not found".to_string()
        }
    );

    let broken = gateway.get_conversation("conv_broken").await.unwrap_err();
    assert_eq!(broken.status(), Some(500));
    assert_eq!(broken.to_string(), "Something went wrong (500)");
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    // Grab a free port, then close it again
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gateway = HttpGateway::new(format!("http://{}/api", addr), BearerToken::new());
    let err = gateway.list_conversations().await.unwrap_err();

    assert!(matches!(err, ApiError::Network { status: None, .. }));
}

#[tokio::test]
async fn test_delete_accepts_empty_body() {
    let (url, _backend) = spawn_backend().await;
    let token = BearerToken::new();
    token.set(TOKEN).await;
    let gateway = HttpGateway::new(url, token);

    gateway.delete_conversation("conv_new").await.unwrap();
}

#[tokio::test]
async fn test_app_over_http() {
    let (url, backend) = spawn_backend().await;
    let token = BearerToken::new();
    let gateway = Arc::new(HttpGateway::new(url.clone(), token.clone()));
    let (notifier, _notifications) = Notifier::channel();
    let config = Config {
        api_url: url,
        ..Config::default()
    };
    let app = App::from_parts(
        config,
        gateway,
        Arc::new(MemoryStorage::new()),
        token,
        notifier,
    );

    app.auth.login("alice", "secret1").await.unwrap();

    let listed = app.chat.list_conversations().await;
    let ids: Vec<_> = listed.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["conv_new", "conv_old"]);

    app.chat.select_conversation("conv_new").await;
    assert_eq!(app.chat.messages().await.len(), 1);

    let created = app.chat.create_conversation().await.unwrap();
    assert_eq!(created.id, "conv_http");
    app.chat.send_message("hello").await.unwrap();

    let state = app.chat.snapshot().await;
    let last = state.messages.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content, "You said: hello");

    let seen = backend.seen_auth.lock().unwrap().clone();
    assert!(seen
        .iter()
        .all(|auth| auth.as_deref() == Some("Bearer tok_alice")));
}
