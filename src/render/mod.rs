//! Document rendering and fixed-layout conversion collaborators.
//!
//! Rendering is an external capability — this core only drives it.
//! [`DocumentRenderer`] turns the assembled Markdown (plus per-section
//! images and formatting options) into a page-layout file, and the quiz
//! map into its own document; [`PdfConverter`] converts a rendered file
//! to fixed layout.  The HTTP adapters post content and write the
//! returned bytes into the run's temp directory.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RenderConfig;
use crate::quiz::QuizByPage;
use crate::retry::Recoverable;

// ---------------------------------------------------------------------------
// RenderOptions
// ---------------------------------------------------------------------------

/// Customer formatting choices carried on the order: color theme and
/// column layout.  Free-form strings from the ledger; the renderer maps
/// unknown values to its defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub color: String,
    pub columns: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            color: "blue".into(),
            columns: "single".into(),
        }
    }
}

impl RenderOptions {
    /// Options from the ledger row's choices, defaulting empty fields.
    pub fn from_choices(color: &str, columns: &str) -> Self {
        let defaults = Self::default();
        Self {
            color: if color.trim().is_empty() {
                defaults.color
            } else {
                color.trim().to_string()
            },
            columns: if columns.trim().is_empty() {
                defaults.columns
            } else {
                columns.trim().to_string()
            },
        }
    }
}

// ---------------------------------------------------------------------------
// RenderError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RenderError {
    /// Transport error or upstream 5xx.
    #[error("render request failed: {0}")]
    Http(String),

    /// The request did not complete within the configured timeout.
    #[error("render request timed out")]
    Timeout,

    /// The upstream rejected the content (4xx).
    #[error("render request rejected: {0}")]
    Rejected(String),

    /// Local file read/write failure.
    #[error("render file I/O failed: {0}")]
    Io(String),
}

impl From<reqwest::Error> for RenderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RenderError::Timeout
        } else {
            RenderError::Http(e.to_string())
        }
    }
}

impl Recoverable for RenderError {
    fn is_recoverable(&self) -> bool {
        matches!(self, RenderError::Http(_) | RenderError::Timeout)
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Renders content to page-layout files.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Render the assembled Markdown document, embedding one image per
    /// page where `images` provides one, and write the result to
    /// `out_path`.
    async fn render_document(
        &self,
        markdown: &str,
        images: &BTreeMap<u32, String>,
        options: &RenderOptions,
        out_path: &Path,
    ) -> Result<(), RenderError>;

    /// Render the quiz map to its own document at `out_path`.
    async fn render_quiz(
        &self,
        quiz: &QuizByPage,
        options: &RenderOptions,
        out_path: &Path,
    ) -> Result<(), RenderError>;
}

/// Converts a page-layout file to fixed layout.
#[async_trait]
pub trait PdfConverter: Send + Sync {
    /// Convert `input` and write the fixed-layout result to `out_path`.
    async fn convert(&self, input: &Path, out_path: &Path) -> Result<(), RenderError>;
}

// ---------------------------------------------------------------------------
// HTTP adapters
// ---------------------------------------------------------------------------

/// Thin REST adapter for both rendering and conversion:
///
/// ```text
/// POST {base}/render/document  {markdown, images, options} → file bytes
/// POST {base}/render/quiz      {quiz, options}             → file bytes
/// POST {base}/convert/pdf      raw file bytes              → file bytes
/// ```
pub struct HttpRenderer {
    client: reqwest::Client,
    config: RenderConfig,
}

impl HttpRenderer {
    pub fn from_config(config: &RenderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    async fn fetch_file(
        &self,
        request: reqwest::RequestBuilder,
        out_path: &Path,
    ) -> Result<(), RenderError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status.is_client_error() {
                RenderError::Rejected(format!("{status}: {body}"))
            } else {
                RenderError::Http(format!("renderer returned {status}: {body}"))
            });
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(out_path, &bytes)
            .await
            .map_err(|e| RenderError::Io(format!("{}: {e}", out_path.display())))
    }
}

#[async_trait]
impl DocumentRenderer for HttpRenderer {
    async fn render_document(
        &self,
        markdown: &str,
        images: &BTreeMap<u32, String>,
        options: &RenderOptions,
        out_path: &Path,
    ) -> Result<(), RenderError> {
        let body = serde_json::json!({
            "markdown": markdown,
            "images":   images,
            "options":  options,
        });

        let request = self
            .client
            .post(format!("{}/render/document", self.config.base_url))
            .json(&body);
        self.fetch_file(request, out_path).await
    }

    async fn render_quiz(
        &self,
        quiz: &QuizByPage,
        options: &RenderOptions,
        out_path: &Path,
    ) -> Result<(), RenderError> {
        let body = serde_json::json!({
            "quiz":    quiz,
            "options": options,
        });

        let request = self
            .client
            .post(format!("{}/render/quiz", self.config.base_url))
            .json(&body);
        self.fetch_file(request, out_path).await
    }
}

#[async_trait]
impl PdfConverter for HttpRenderer {
    async fn convert(&self, input: &Path, out_path: &Path) -> Result<(), RenderError> {
        let bytes = tokio::fs::read(input)
            .await
            .map_err(|e| RenderError::Io(format!("{}: {e}", input.display())))?;

        let request = self
            .client
            .post(format!("{}/convert/pdf", self.config.base_url))
            .body(bytes);
        self.fetch_file(request, out_path).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config() -> RenderConfig {
        RenderConfig {
            base_url: "http://localhost:9092".into(),
            timeout_secs: 120,
        }
    }

    #[test]
    fn from_config_builds_without_panic() {
        let _renderer = HttpRenderer::from_config(&make_config());
    }

    #[test]
    fn renderer_and_converter_are_object_safe() {
        let renderer = std::sync::Arc::new(HttpRenderer::from_config(&make_config()));
        let _as_renderer: std::sync::Arc<dyn DocumentRenderer> = renderer.clone();
        let _as_converter: std::sync::Arc<dyn PdfConverter> = renderer;
    }

    // ---- RenderOptions ---

    #[test]
    fn default_options_are_blue_single() {
        let options = RenderOptions::default();
        assert_eq!(options.color, "blue");
        assert_eq!(options.columns, "single");
    }

    #[test]
    fn from_choices_keeps_ledger_values() {
        let options = RenderOptions::from_choices("green", "double");
        assert_eq!(options.color, "green");
        assert_eq!(options.columns, "double");
    }

    #[test]
    fn from_choices_defaults_blank_fields() {
        let options = RenderOptions::from_choices("", "  ");
        assert_eq!(options.color, "blue");
        assert_eq!(options.columns, "single");
    }

    // ---- classification ---

    #[test]
    fn transport_errors_are_recoverable_rejections_are_not() {
        assert!(RenderError::Http("503".into()).is_recoverable());
        assert!(RenderError::Timeout.is_recoverable());
        assert!(!RenderError::Rejected("bad markdown".into()).is_recoverable());
        assert!(!RenderError::Io("disk full".into()).is_recoverable());
    }
}
