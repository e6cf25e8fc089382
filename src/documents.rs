// src/documents.rs
// Client for the backend's documents API. A collaborator of the chat core:
// the REPL binary talks to it, the session manager never does.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub name: String,
    #[serde(default)]
    pub indexed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentListResponse {
    #[serde(default)]
    pub documents: Vec<DocumentInfo>,
    #[serde(default)]
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResult {
    #[serde(default)]
    pub added: usize,
    #[serde(default)]
    pub skipped: usize,
    #[serde(default)]
    pub vlm_enabled: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResult {
    pub success: bool,
    pub message: String,
}

pub struct DocumentsClient {
    http: reqwest::Client,
    base_url: String,
}

impl DocumentsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// List all indexed documents.
    pub async fn list_documents(&self) -> Result<DocumentListResponse, TransportError> {
        let url = format!("{}/api/v1/documents", self.base_url);
        let response = self.http.get(&url).send().await?;
        Self::check(response).await?.json().await.map_err(Into::into)
    }

    /// Upload PDF/Markdown files for indexing. `enable_vlm` asks the
    /// backend for AI-generated image captions (slower).
    pub async fn upload_documents(
        &self,
        paths: &[impl AsRef<Path>],
        enable_vlm: bool,
    ) -> Result<UploadResult, TransportError> {
        let url = format!("{}/api/v1/documents/upload", self.base_url);

        let mut form = reqwest::multipart::Form::new().text("enable_vlm", enable_vlm.to_string());
        for path in paths {
            let path = path.as_ref();
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let bytes = tokio::fs::read(path).await?;
            form = form.part(
                "files",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        }

        let response = self.http.post(&url).multipart(form).send().await?;
        Self::check(response).await?.json().await.map_err(Into::into)
    }

    /// Remove every indexed document from the knowledge base.
    pub async fn clear_documents(&self) -> Result<ClearResult, TransportError> {
        let url = format!("{}/api/v1/documents/clear", self.base_url);
        let response = self.http.delete(&url).send().await?;
        Self::check(response).await?.json().await.map_err(Into::into)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::BadStatus { status, body });
        }
        Ok(response)
    }
}
