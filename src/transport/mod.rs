// src/transport/mod.rs
// Two physical transports behind one manager-facing surface: a long-lived
// WebSocket that delivers events asynchronously, and a unary HTTP call that
// returns the whole reply. Lifecycle is normalized into `TransportEvent`;
// the manager only ever branches on `SendOutcome`, never on the variant.

pub mod http;
pub mod ws;

pub use http::UnaryTransport;
pub use ws::StreamingTransport;

use crate::error::TransportError;
use crate::protocol::{ChatResponse, ServerEvent};

/// Normalized lifecycle events delivered by the streaming transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// Connection established.
    Opened,
    /// Decoded protocol event from the backend.
    Event(ServerEvent),
    /// Connection closed by the peer.
    Closed,
    /// Socket-level failure.
    Failed(String),
}

/// The transport the fallback policy selected for this send.
pub enum ActiveTransport<'a> {
    Streaming(&'a StreamingTransport),
    Unary(&'a UnaryTransport),
}

/// How a dispatched message will be answered.
#[derive(Debug)]
pub enum SendOutcome {
    /// Fire-and-forget: the reply arrives through transport events.
    Dispatched,
    /// Unary round trip: the full reply is already here.
    Reply(ChatResponse),
}

impl ActiveTransport<'_> {
    pub async fn send_message(
        &self,
        text: &str,
        thread_id: Option<&str>,
    ) -> Result<SendOutcome, TransportError> {
        match self {
            ActiveTransport::Streaming(transport) => {
                transport.send_user_message(text).await?;
                Ok(SendOutcome::Dispatched)
            }
            ActiveTransport::Unary(transport) => {
                let reply = transport.send(text, thread_id).await?;
                Ok(SendOutcome::Reply(reply))
            }
        }
    }
}
