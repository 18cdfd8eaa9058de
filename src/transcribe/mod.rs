//! Speech-to-text collaborator.
//!
//! [`Transcriber`] is the narrow contract the pipeline drives;
//! [`PollingTranscriber`] implements it against a submit-then-poll REST
//! API: submit the audio URL, then poll the job until it completes,
//! fails upstream, or exceeds the configured deadline.  Timeout and
//! upstream failure are distinct, non-retryable outcomes — transport
//! hiccups during submit/poll are the retryable ones.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::TranscriptionConfig;
use crate::retry::Recoverable;

// ---------------------------------------------------------------------------
// TranscribeError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TranscribeError {
    /// Transport error or upstream 5xx during submit/poll.
    #[error("transcription request failed: {0}")]
    Http(String),

    /// Upstream rate limit (HTTP 429).
    #[error("transcription rate-limited by upstream")]
    RateLimited,

    /// Authentication failure (HTTP 401/403).
    #[error("transcription authentication failed: {0}")]
    Auth(String),

    /// Processing exceeded the configured deadline.
    #[error("transcription timed out after {0:?} (status={1})")]
    TimedOut(Duration, String),

    /// The upstream job ended in an error state.
    #[error("transcription failed upstream: {0}")]
    Failed(String),

    /// The response could not be decoded.
    #[error("failed to decode transcription response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TranscribeError {
    fn from(e: reqwest::Error) -> Self {
        TranscribeError::Http(e.to_string())
    }
}

impl Recoverable for TranscribeError {
    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TranscribeError::Http(_) | TranscribeError::RateLimited
        )
    }
}

// ---------------------------------------------------------------------------
// Transcriber trait
// ---------------------------------------------------------------------------

/// Async speech-to-text contract.
///
/// Implementors must be `Send + Sync` so they can be held behind an
/// `Arc<dyn Transcriber>`.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio at `audio_url` and return the full text.
    async fn transcribe(&self, audio_url: &str) -> Result<String, TranscribeError>;
}

// ---------------------------------------------------------------------------
// Poll outcome
// ---------------------------------------------------------------------------

/// Decoded state of one poll response.
#[derive(Debug, PartialEq)]
enum PollState {
    /// Job finished; carries the transcript text.
    Completed(String),
    /// Still queued or processing.
    InProgress(String),
    /// Upstream error; carries the upstream message.
    Failed(String),
}

fn poll_state(json: &serde_json::Value) -> Result<PollState, TranscribeError> {
    let status = json["status"]
        .as_str()
        .ok_or_else(|| TranscribeError::Decode("poll response missing \"status\"".into()))?;

    match status {
        "completed" => Ok(PollState::Completed(
            json["text"].as_str().unwrap_or_default().to_string(),
        )),
        "queued" | "processing" => Ok(PollState::InProgress(status.to_string())),
        "error" => Ok(PollState::Failed(
            json["error"].as_str().unwrap_or("unknown upstream error").to_string(),
        )),
        other => Ok(PollState::InProgress(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// PollingTranscriber
// ---------------------------------------------------------------------------

/// Submit-then-poll adapter implementing [`Transcriber`]:
///
/// ```text
/// POST {base}/v2/transcript  {"audio_url": "…"}  → {"id": "…"}
/// GET  {base}/v2/transcript/{id}                 → {"status": "…", …}
/// ```
pub struct PollingTranscriber {
    client: reqwest::Client,
    config: TranscriptionConfig,
}

impl PollingTranscriber {
    pub fn from_config(config: &TranscriptionConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    async fn decode_json(response: reqwest::Response) -> Result<serde_json::Value, TranscribeError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => TranscribeError::Auth(body),
                429 => TranscribeError::RateLimited,
                _ => TranscribeError::Http(format!("upstream returned {status}: {body}")),
            });
        }
        response
            .json()
            .await
            .map_err(|e| TranscribeError::Decode(e.to_string()))
    }

    async fn submit(&self, audio_url: &str) -> Result<String, TranscribeError> {
        let response = self
            .client
            .post(format!("{}/v2/transcript", self.config.base_url))
            .header("authorization", self.config.api_key.as_str())
            .json(&serde_json::json!({ "audio_url": audio_url }))
            .send()
            .await?;

        let json = Self::decode_json(response).await?;
        json["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TranscribeError::Decode("submit response missing \"id\"".into()))
    }

    async fn poll_once(&self, job_id: &str) -> Result<PollState, TranscribeError> {
        let response = self
            .client
            .get(format!("{}/v2/transcript/{job_id}", self.config.base_url))
            .header("authorization", self.config.api_key.as_str())
            .send()
            .await?;

        let json = Self::decode_json(response).await?;
        poll_state(&json)
    }
}

#[async_trait]
impl Transcriber for PollingTranscriber {
    async fn transcribe(&self, audio_url: &str) -> Result<String, TranscribeError> {
        let job_id = self.submit(audio_url).await?;
        log::info!("transcription job {job_id} submitted");

        let deadline = Duration::from_secs(self.config.deadline_secs);
        let poll_interval = Duration::from_secs(self.config.poll_interval_secs.max(1));
        let started = Instant::now();

        loop {
            match self.poll_once(&job_id).await? {
                PollState::Completed(text) => {
                    log::info!("transcription job {job_id} completed ({} chars)", text.len());
                    return Ok(text);
                }
                PollState::Failed(message) => {
                    return Err(TranscribeError::Failed(message));
                }
                PollState::InProgress(status) => {
                    if started.elapsed() > deadline {
                        return Err(TranscribeError::TimedOut(deadline, status));
                    }
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config() -> TranscriptionConfig {
        TranscriptionConfig {
            base_url: "https://api.example.com".into(),
            api_key: "key".into(),
            poll_interval_secs: 5,
            deadline_secs: 600,
            request_timeout_secs: 30,
        }
    }

    #[test]
    fn from_config_builds_without_panic() {
        let _transcriber = PollingTranscriber::from_config(&make_config());
    }

    #[test]
    fn transcriber_is_object_safe() {
        let t: Box<dyn Transcriber> = Box::new(PollingTranscriber::from_config(&make_config()));
        drop(t);
    }

    // ---- poll_state ---

    #[test]
    fn completed_poll_carries_the_text() {
        let json = serde_json::json!({"status": "completed", "text": "hello world"});
        assert_eq!(
            poll_state(&json).unwrap(),
            PollState::Completed("hello world".into())
        );
    }

    #[test]
    fn queued_and_processing_are_in_progress() {
        for status in ["queued", "processing"] {
            let json = serde_json::json!({ "status": status });
            assert_eq!(
                poll_state(&json).unwrap(),
                PollState::InProgress(status.into())
            );
        }
    }

    #[test]
    fn error_poll_carries_the_upstream_message() {
        let json = serde_json::json!({"status": "error", "error": "audio unreadable"});
        assert_eq!(
            poll_state(&json).unwrap(),
            PollState::Failed("audio unreadable".into())
        );
    }

    #[test]
    fn missing_status_is_a_decode_error() {
        let json = serde_json::json!({"text": "incomplete"});
        assert!(matches!(
            poll_state(&json).unwrap_err(),
            TranscribeError::Decode(_)
        ));
    }

    // ---- classification ---

    #[test]
    fn transport_and_rate_limit_are_recoverable() {
        assert!(TranscribeError::Http("503".into()).is_recoverable());
        assert!(TranscribeError::RateLimited.is_recoverable());
    }

    /// A deadline overrun or upstream failure means the whole stage
    /// fails — re-running the poll loop immediately cannot help.
    #[test]
    fn timeout_and_failure_are_not_recoverable() {
        let timeout = TranscribeError::TimedOut(Duration::from_secs(600), "processing".into());
        assert!(!timeout.is_recoverable());
        assert!(!TranscribeError::Failed("bad audio".into()).is_recoverable());
        assert!(!TranscribeError::Auth("401".into()).is_recoverable());
    }

    #[test]
    fn timeout_display_names_duration_and_status() {
        let err = TranscribeError::TimedOut(Duration::from_secs(600), "processing".into());
        let message = err.to_string();
        assert!(message.contains("600"));
        assert!(message.contains("processing"));
    }
}
