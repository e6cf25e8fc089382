// src/lib.rs

pub mod accumulator;
pub mod config;
pub mod documents;
pub mod error;
pub mod fallback;
pub mod manager;
pub mod protocol;
pub mod session;
pub mod transport;

pub use manager::{ChatClient, ChatSnapshot};
pub use session::ConnectionStatus;
