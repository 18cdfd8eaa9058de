//! Object storage collaborator.
//!
//! [`ObjectStore`] covers the two things the pipeline needs from
//! storage: uploading a produced artifact and issuing a fetchable URL
//! for an object that is already stored (used to re-derive an audio URL
//! when the ledger row lacks one).  Returned URLs are treated as
//! time-bounded, publicly fetchable references.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::StorageConfig;
use crate::retry::Recoverable;

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StorageError {
    /// Transport error or upstream 5xx.
    #[error("storage request failed: {0}")]
    Http(String),

    /// The request did not complete within the configured timeout.
    #[error("storage request timed out")]
    Timeout,

    /// The local file could not be read.
    #[error("could not read local file: {0}")]
    Io(String),

    /// The response lacked the expected URL payload.
    #[error("failed to decode storage response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StorageError::Timeout
        } else {
            StorageError::Http(e.to_string())
        }
    }
}

impl Recoverable for StorageError {
    fn is_recoverable(&self) -> bool {
        matches!(self, StorageError::Http(_) | StorageError::Timeout)
    }
}

// ---------------------------------------------------------------------------
// ObjectStore trait
// ---------------------------------------------------------------------------

/// Upload and URL-issuance contract over the object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `local_file` under `name` and return its public URL.
    async fn upload(&self, local_file: &Path, name: &str) -> Result<String, StorageError>;

    /// Issue a fetchable URL for an object already stored under
    /// `stored_key`.
    async fn url_for(&self, stored_key: &str) -> Result<String, StorageError>;
}

// ---------------------------------------------------------------------------
// HttpStore
// ---------------------------------------------------------------------------

/// Thin REST adapter implementing [`ObjectStore`]:
///
/// ```text
/// POST {base}/upload?name={name}   raw bytes  → {"url": "…"}
/// POST {base}/sign?name={key}                 → {"url": "…"}
/// ```
pub struct HttpStore {
    client: reqwest::Client,
    config: StorageConfig,
}

impl HttpStore {
    pub fn from_config(config: &StorageConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => req.bearer_auth(key),
            _ => req,
        }
    }

    async fn extract_url(response: reqwest::Response) -> Result<String, StorageError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Http(format!("storage returned {status}: {body}")));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| StorageError::Decode(e.to_string()))?;
        json["url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| StorageError::Decode("response missing \"url\"".into()))
    }
}

#[async_trait]
impl ObjectStore for HttpStore {
    async fn upload(&self, local_file: &Path, name: &str) -> Result<String, StorageError> {
        let bytes = tokio::fs::read(local_file)
            .await
            .map_err(|e| StorageError::Io(format!("{}: {e}", local_file.display())))?;

        let response = self
            .authorized(
                self.client
                    .post(format!("{}/upload", self.config.base_url))
                    .query(&[("name", name)])
                    .body(bytes),
            )
            .send()
            .await?;

        Self::extract_url(response).await
    }

    async fn url_for(&self, stored_key: &str) -> Result<String, StorageError> {
        let response = self
            .authorized(
                self.client
                    .post(format!("{}/sign", self.config.base_url))
                    .query(&[("name", stored_key)]),
            )
            .send()
            .await?;

        Self::extract_url(response).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
