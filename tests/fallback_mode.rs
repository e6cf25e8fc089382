// tests/fallback_mode.rs
// The backend here speaks HTTP only: every streaming open fails, so the
// manager must exhaust its retries and settle permanently on the unary
// transport.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;

use docuchat::documents::DocumentsClient;
use docuchat::manager::{ChatClient, ChatSnapshot, ClientOptions};
use docuchat::session::Role;
use docuchat::ConnectionStatus;

#[derive(Clone)]
struct MockState {
    thread_id: Arc<String>,
}

async fn spawn_http_only_backend() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new()
        .route("/api/v1/chat/message", post(chat_message))
        .route("/api/v1/documents", get(list_documents))
        .route("/api/v1/documents/clear", delete(clear_documents))
        .with_state(MockState {
            thread_id: Arc::new("t-unary".to_string()),
        });

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://127.0.0.1:{}", addr.port())
}

async fn chat_message(
    State(state): State<MockState>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let message = body["message"].as_str().unwrap_or("");
    if message == "fail" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "kaboom").into_response();
    }
    Json(json!({
        "response": format!("echo: {message}"),
        "thread_id": *state.thread_id,
        "has_images": false,
    }))
    .into_response()
}

async fn list_documents() -> impl IntoResponse {
    Json(json!({
        "documents": [{"name": "manual.pdf"}, {"name": "notes.md"}],
        "count": 2,
    }))
}

async fn clear_documents() -> impl IntoResponse {
    Json(json!({"success": true, "message": "All documents cleared from knowledge base"}))
}

fn test_options(backend_url: &str) -> ClientOptions {
    let mut options = ClientOptions::new(backend_url);
    options.max_reconnect_attempts = 2;
    options.reconnect_delay = Duration::from_millis(50);
    options
}

async fn wait_until<F>(
    snapshots: &mut watch::Receiver<ChatSnapshot>,
    predicate: F,
) -> ChatSnapshot
where
    F: Fn(&ChatSnapshot) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        {
            let snapshot = snapshots.borrow_and_update();
            if predicate(&snapshot) {
                return snapshot.clone();
            }
        }
        tokio::time::timeout_at(deadline, snapshots.changed())
            .await
            .expect("timed out waiting for snapshot")
            .expect("manager stopped");
    }
}

#[tokio::test]
async fn repeated_open_failures_switch_permanently_to_fallback() {
    let backend = spawn_http_only_backend().await;
    let client = ChatClient::start(test_options(&backend)).unwrap();
    let mut snapshots = client.subscribe();

    let settled = wait_until(&mut snapshots, |s| s.status == ConnectionStatus::Fallback).await;
    assert!(settled.can_send());

    // Sends now take the unary path even though no streaming connection
    // ever existed.
    client.send("hello").await;
    let settled =
        wait_until(&mut snapshots, |s| s.messages.len() == 2 && !s.reply_pending).await;

    assert_eq!(settled.messages[0].role, Role::User);
    assert_eq!(settled.messages[1].content, "echo: hello");
    assert_eq!(settled.thread_id.as_deref(), Some("t-unary"));
    assert_eq!(settled.status, ConnectionStatus::Fallback);

    client.shutdown().await;
}

#[tokio::test]
async fn unary_failure_surfaces_as_error_message_not_status_change() {
    let backend = spawn_http_only_backend().await;
    let client = ChatClient::start(test_options(&backend)).unwrap();
    let mut snapshots = client.subscribe();

    wait_until(&mut snapshots, |s| s.status == ConnectionStatus::Fallback).await;

    client.send("fail").await;
    let settled =
        wait_until(&mut snapshots, |s| s.messages.len() == 2 && !s.reply_pending).await;

    assert_eq!(settled.messages[1].role, Role::Assistant);
    assert!(settled.messages[1].content.starts_with("Error: "));
    assert_eq!(settled.status, ConnectionStatus::Fallback);
    assert!(settled.can_send());

    client.shutdown().await;
}

#[tokio::test]
async fn fallback_clear_is_purely_local() {
    let backend = spawn_http_only_backend().await;
    let client = ChatClient::start(test_options(&backend)).unwrap();
    let mut snapshots = client.subscribe();

    wait_until(&mut snapshots, |s| s.status == ConnectionStatus::Fallback).await;
    client.send("hello").await;
    wait_until(&mut snapshots, |s| s.messages.len() == 2 && !s.reply_pending).await;

    client.clear().await;
    let settled = wait_until(&mut snapshots, |s| s.messages.is_empty()).await;

    assert_eq!(settled.thread_id, None);
    assert_eq!(settled.status, ConnectionStatus::Fallback);

    // The next send starts a fresh server thread.
    client.send("again").await;
    let settled = wait_until(&mut snapshots, |s| s.messages.len() == 2).await;
    assert_eq!(settled.thread_id.as_deref(), Some("t-unary"));

    client.shutdown().await;
}

#[tokio::test]
async fn connect_is_idempotent_in_fallback_mode() {
    let backend = spawn_http_only_backend().await;
    let client = ChatClient::start(test_options(&backend)).unwrap();
    let mut snapshots = client.subscribe();

    wait_until(&mut snapshots, |s| s.status == ConnectionStatus::Fallback).await;

    // Fallback is absorbing: connect must not leave it, even transiently.
    client.connect().await;
    client.send("hello").await;
    let settled = wait_until(&mut snapshots, |s| s.messages.len() == 2).await;
    assert_eq!(settled.status, ConnectionStatus::Fallback);

    client.shutdown().await;
}

#[tokio::test]
async fn documents_client_round_trips() {
    let backend = spawn_http_only_backend().await;
    let documents = DocumentsClient::new(&backend, Duration::from_secs(5)).unwrap();

    let list = documents.list_documents().await.unwrap();
    assert_eq!(list.count, 2);
    assert_eq!(list.documents[0].name, "manual.pdf");

    let cleared = documents.clear_documents().await.unwrap();
    assert!(cleared.success);
}
