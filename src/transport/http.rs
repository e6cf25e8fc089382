// src/transport/http.rs
// Unary transport: one standalone POST round trip per message. No
// connection lifecycle — each call carries the current thread id and the
// response carries the (possibly new) one back.

use std::time::Duration;

use crate::error::TransportError;
use crate::protocol::{ChatRequest, ChatResponse};

pub struct UnaryTransport {
    http: reqwest::Client,
    base_url: String,
}

impl UnaryTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Send one message and wait for the full reply body.
    pub async fn send(
        &self,
        message: &str,
        thread_id: Option<&str>,
    ) -> Result<ChatResponse, TransportError> {
        let url = format!("{}/api/v1/chat/message", self.base_url);
        let request = ChatRequest {
            message: message.to_string(),
            thread_id: thread_id.map(str::to_string),
        };

        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::BadStatus { status, body });
        }

        Ok(response.json::<ChatResponse>().await?)
    }
}
