// src/transport/ws.rs
// Streaming transport: one long-lived WebSocket connection. A spawned
// reader task decodes backend frames and forwards normalized events over a
// per-connection channel; writes go through the split sink.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::TransportError;
use crate::protocol::{ClientFrame, ServerEvent};
use crate::transport::TransportEvent;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

pub struct StreamingTransport {
    sender: Mutex<WsSink>,
    events: mpsc::Receiver<TransportEvent>,
    reader: JoinHandle<()>,
}

impl StreamingTransport {
    /// Open a connection, resuming `thread_id` when present. The backend's
    /// handshake (`session` event) arrives through `next_event`.
    pub async fn connect(
        base_url: &str,
        thread_id: Option<&str>,
    ) -> Result<Self, TransportError> {
        let url = build_ws_url(base_url, thread_id)?;

        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|source| TransportError::Connect { url: url.clone(), source })?;

        let (sender, mut receiver) = ws_stream.split();
        let (event_tx, events) = mpsc::channel(100);

        // Queue the open notification ahead of anything the reader decodes.
        let _ = event_tx.try_send(TransportEvent::Opened);

        let reader = tokio::spawn(async move {
            while let Some(msg_result) = receiver.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        let Some(event) = ServerEvent::parse(&text) else {
                            debug!("dropping undecodable frame: {}", text);
                            continue;
                        };
                        if event_tx.send(TransportEvent::Event(event)).await.is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        let _ = event_tx.send(TransportEvent::Closed).await;
                        return;
                    }
                    Err(e) => {
                        let _ = event_tx.send(TransportEvent::Failed(e.to_string())).await;
                        return;
                    }
                    _ => {} // Binary/Ping/Pong
                }
            }
            // Stream ended without a close frame.
            let _ = event_tx.send(TransportEvent::Closed).await;
        });

        Ok(Self {
            sender: Mutex::new(sender),
            events,
            reader,
        })
    }

    /// Next normalized event, in arrival order. `None` after the reader has
    /// shut down and all queued events were drained.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    pub async fn send_user_message(&self, text: &str) -> Result<(), TransportError> {
        self.send_frame(&ClientFrame::user(text)).await
    }

    /// Ask the backend to drop its server-side thread state.
    pub async fn send_clear(&self) -> Result<(), TransportError> {
        self.send_frame(&ClientFrame::clear()).await
    }

    async fn send_frame(&self, frame: &ClientFrame) -> Result<(), TransportError> {
        let json = serde_json::to_string(frame)?;
        let mut sender = self.sender.lock().await;
        sender.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Close the connection and stop the reader task.
    pub async fn close(&self) {
        let mut sender = self.sender.lock().await;
        let _ = sender.send(Message::Close(None)).await;
        self.reader.abort();
    }
}

impl Drop for StreamingTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Derive the streaming endpoint from the HTTP base URL. The resume thread
/// id rides as a query parameter; its absence signals a fresh session.
fn build_ws_url(base_url: &str, thread_id: Option<&str>) -> Result<String, TransportError> {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(TransportError::InvalidUrl(base.to_string()));
    };

    let mut url = format!("{ws_base}/api/v1/chat/stream");
    if let Some(id) = thread_id {
        url.push_str("?thread_id=");
        url.push_str(&urlencoding::encode(id));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_without_thread_id() {
        let url = build_ws_url("http://localhost:8000", None).unwrap();
        assert_eq!(url, "ws://localhost:8000/api/v1/chat/stream");
    }

    #[test]
    fn ws_url_with_thread_id_and_tls() {
        let url = build_ws_url("https://chat.example.com/", Some("t 1")).unwrap();
        assert_eq!(url, "wss://chat.example.com/api/v1/chat/stream?thread_id=t%201");
    }

    #[test]
    fn ws_url_rejects_unknown_scheme() {
        assert!(build_ws_url("ftp://nope", None).is_err());
    }
}
