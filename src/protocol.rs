// src/protocol.rs
// Wire types for the chat backend, both transports.
//
// Streaming (WebSocket): client sends `ClientFrame`, backend answers with a
// stream of `ServerEvent`s discriminated on "type". Unary (HTTP fallback):
// one `ChatRequest` -> `ChatResponse` round trip per message.

use serde::{Deserialize, Serialize};

/// Sentinel message that asks the backend to reset server-side thread state.
pub const CLEAR_SENTINEL: &str = "__clear__";

/// Client -> backend frame on the streaming transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFrame {
    pub message: String,
}

impl ClientFrame {
    pub fn user(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn clear() -> Self {
        Self { message: CLEAR_SENTINEL.to_string() }
    }
}

/// Backend -> client event on the streaming transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    /// Handshake: the backend's thread id for this session. Sent on connect
    /// and again after a server-side clear.
    Session { thread_id: String },
    /// Incremental text fragment of the pending reply.
    Token { content: String },
    /// Terminal signal: the pending reply is complete.
    Done,
    /// Backend-reported failure for the pending reply.
    Error { content: String },
    /// Server-side session state was reset.
    Cleared,
    /// Image references attached to the pending reply.
    Images { images: Vec<serde_json::Value> },
}

impl ServerEvent {
    /// Decode a raw text frame. Undecodable payloads yield `None` and are
    /// dropped at the transport boundary.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Unary fallback request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Unary fallback response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub thread_id: String,
    #[serde(default)]
    pub has_images: bool,
}
