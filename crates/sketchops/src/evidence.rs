//! Loading the text content of uploaded evidence files.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::debug;

use crate::models::UploadedFile;

#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error("download of file {id} failed: {source}")]
    Http {
        id: i64,
        #[source]
        source: reqwest::Error,
    },

    #[error("download of file {id} returned HTTP {status}")]
    Status { id: i64, status: u16 },

    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stored path '{0}' escapes the uploads directory")]
    InvalidPath(String),

    #[error("file {id} is not valid UTF-8 text")]
    NotText { id: i64 },
}

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Returns the full text content of `file`.
    async fn load(&self, file: &UploadedFile) -> Result<String, EvidenceError>;
}

/// Downloads files from the chat platform's API (`/api/files/download/{id}`).
pub struct ApiEvidenceStore {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl ApiEvidenceStore {
    pub fn new(base_url: &str, api_key: SecretString, timeout: std::time::Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn download_url(&self, id: i64) -> String {
        format!("{}/api/files/download/{}", self.base_url, id)
    }
}

#[async_trait]
impl EvidenceStore for ApiEvidenceStore {
    async fn load(&self, file: &UploadedFile) -> Result<String, EvidenceError> {
        let url = self.download_url(file.id);
        debug!("Downloading evidence file {}", file.id);

        let response = self
            .client
            .get(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| EvidenceError::Http {
                id: file.id,
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(EvidenceError::Status {
                id: file.id,
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| EvidenceError::Http {
            id: file.id,
            source: e,
        })?;
        String::from_utf8(bytes.to_vec()).map_err(|_| EvidenceError::NotText { id: file.id })
    }
}

/// Reads files from a shared uploads directory.
pub struct LocalEvidenceStore {
    root: PathBuf,
}

impl LocalEvidenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, stored: &str) -> Result<PathBuf, EvidenceError> {
        let relative = Path::new(stored);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe || stored.is_empty() {
            return Err(EvidenceError::InvalidPath(stored.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl EvidenceStore for LocalEvidenceStore {
    async fn load(&self, file: &UploadedFile) -> Result<String, EvidenceError> {
        let path = self.resolve(&file.stored_path)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| EvidenceError::Io { path, source: e })?;
        String::from_utf8(bytes).map_err(|_| EvidenceError::NotText { id: file.id })
    }
}
