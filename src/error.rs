// src/error.rs
// Transport-level error taxonomy. None of these are fatal to the session:
// connection failures feed the fallback policy, call failures surface as
// visible error messages in the transcript.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open streaming connection to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("streaming send failed: {0}")]
    StreamSend(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("unary request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend rejected request: {status} {body}")]
    BadStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid backend url: {0}")]
    InvalidUrl(String),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("could not read upload file: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport closed")]
    Closed,
}
