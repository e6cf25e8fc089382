// src/session.rs
// Session data model: transcript messages plus the connection-side state.
// Pure data — only the manager mutates these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry. Immutable once a later message exists; the newest
/// assistant message grows by content append while its reply streams in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<serde_json::Value>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            images: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error,
    Fallback,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

/// Connection-side session state. `thread_id` is backend-assigned on the
/// first handshake and reused on every reconnect and unary call so the
/// backend can resume conversational context.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub thread_id: Option<String>,
    pub status: ConnectionStatus,
    pub reconnect_attempts: u32,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            thread_id: None,
            status: ConnectionStatus::Idle,
            reconnect_attempts: 0,
        }
    }

    /// Apply a `session` handshake event. Idempotent: re-receiving the same
    /// id changes nothing except (re)zeroing the reconnect counter.
    pub fn handshake(&mut self, thread_id: String) {
        self.thread_id = Some(thread_id);
        self.reconnect_attempts = 0;
    }

    /// Reset to a fresh session (local clear).
    pub fn reset_thread(&mut self) {
        self.thread_id = None;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
