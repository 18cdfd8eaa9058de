//! Outbound email collaborator.
//!
//! [`Mailer`] sends the delivery notification with the produced
//! artifacts attached.  [`HttpMailer`] posts a multipart message to a
//! provider HTTP API (from/to/subject/html plus one file part per
//! attachment).  An attachment that cannot be read is skipped with a
//! warning — the notification still goes out with whatever could be
//! attached.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::MailConfig;
use crate::retry::Recoverable;

// ---------------------------------------------------------------------------
// MailError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum MailError {
    /// Transport error or upstream 5xx.
    #[error("mail request failed: {0}")]
    Http(String),

    /// The request did not complete within the configured timeout.
    #[error("mail request timed out")]
    Timeout,

    /// Authentication failure (HTTP 401/403).
    #[error("mail authentication failed: {0}")]
    Auth(String),

    /// The provider rejected the message (4xx).
    #[error("mail rejected by provider: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for MailError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MailError::Timeout
        } else {
            MailError::Http(e.to_string())
        }
    }
}

impl Recoverable for MailError {
    fn is_recoverable(&self) -> bool {
        matches!(self, MailError::Http(_) | MailError::Timeout)
    }
}

// ---------------------------------------------------------------------------
// Mailer trait
// ---------------------------------------------------------------------------

/// Outbound email contract.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send an HTML email to `to` with the files at `attachments`
    /// attached.
    async fn send(
        &self,
        to: &[String],
        subject: &str,
        html_body: &str,
        attachments: &[PathBuf],
    ) -> Result<(), MailError>;
}

// ---------------------------------------------------------------------------
// HttpMailer
// ---------------------------------------------------------------------------

/// Multipart HTTP adapter implementing [`Mailer`]:
///
/// ```text
/// POST {base}/messages   multipart: from, to…, subject, html, attachment…
/// ```
pub struct HttpMailer {
    client: reqwest::Client,
    config: MailConfig,
}

impl HttpMailer {
    pub fn from_config(config: &MailConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    async fn attachment_part(path: &Path) -> Option<reqwest::multipart::Part> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("mail: could not read attachment {}: {e} — skipping", path.display());
                return None;
            }
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".into());

        Some(reqwest::multipart::Part::bytes(bytes).file_name(file_name))
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(
        &self,
        to: &[String],
        subject: &str,
        html_body: &str,
        attachments: &[PathBuf],
    ) -> Result<(), MailError> {
        let mut form = reqwest::multipart::Form::new()
            .text("from", self.config.from_address.clone())
            .text("subject", subject.to_string())
            .text("html", html_body.to_string());

        for address in to {
            form = form.text("to", address.clone());
        }

        for path in attachments {
            if let Some(part) = Self::attachment_part(path).await {
                form = form.part("attachment", part);
            }
        }

        let response = self
            .client
            .post(format!("{}/messages", self.config.base_url))
            .basic_auth("api", Some(&self.config.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            log::info!("mail: sent \"{subject}\" to {}", to.join(", "));
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            401 | 403 => MailError::Auth(body),
            400..=499 => MailError::Rejected(format!("{status}: {body}")),
            _ => MailError::Http(format!("provider returned {status}: {body}")),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config() -> MailConfig {
        MailConfig {
            base_url: "https://api.mail.example/v3/domain".into(),
            api_key: "key".into(),
            from_address: "orders@lecturepress.example".into(),
            timeout_secs: 30,
        }
    }

    #[test]
    fn from_config_builds_without_panic() {
        let _mailer = HttpMailer::from_config(&make_config());
    }

    #[test]
    fn mailer_is_object_safe() {
        let mailer: Box<dyn Mailer> = Box::new(HttpMailer::from_config(&make_config()));
        drop(mailer);
    }

    #[tokio::test]
    async fn missing_attachment_is_skipped_not_fatal() {
        let part = HttpMailer::attachment_part(Path::new("/nonexistent/file.pdf")).await;
        assert!(part.is_none());
    }

    #[tokio::test]
    async fn readable_attachment_becomes_a_part() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("doc.docx");
        std::fs::write(&path, b"bytes").unwrap();

        let part = HttpMailer::attachment_part(&path).await;
        assert!(part.is_some());
    }

    #[test]
    fn transport_errors_are_recoverable() {
        assert!(MailError::Http("502".into()).is_recoverable());
        assert!(MailError::Timeout.is_recoverable());
        assert!(!MailError::Auth("401".into()).is_recoverable());
        assert!(!MailError::Rejected("no recipient".into()).is_recoverable());
    }
}
