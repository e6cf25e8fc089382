// src/config.rs
// All values come from the environment (.env honored), with defaults that
// match the reference backend's local setup.

use once_cell::sync::Lazy;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct DocuchatConfig {
    // ── Backend
    pub backend_url: String,

    // ── Reconnect / fallback policy
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,

    // ── Unary transport
    pub request_timeout_secs: u64,

    // ── Logging
    pub log_level: String,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    eprintln!("Config: {} = '{}' (parse failed, using default)", key, val);
                    default
                }
            }
        }
        Err(_) => default,
    }
}

impl DocuchatConfig {
    pub fn from_env() -> Self {
        // .env is optional; plain environment variables win either way.
        let _ = dotenvy::dotenv();

        Self {
            backend_url: env_var_or("DOCUCHAT_BACKEND_URL", "http://localhost:8000".to_string()),
            max_reconnect_attempts: env_var_or("DOCUCHAT_MAX_RECONNECT_ATTEMPTS", 2),
            reconnect_delay_ms: env_var_or("DOCUCHAT_RECONNECT_DELAY_MS", 1000),
            request_timeout_secs: env_var_or("DOCUCHAT_REQUEST_TIMEOUT", 60),
            log_level: env_var_or("DOCUCHAT_LOG_LEVEL", "info".to_string()),
        }
    }
}

pub static CONFIG: Lazy<DocuchatConfig> = Lazy::new(DocuchatConfig::from_env);
