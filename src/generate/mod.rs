//! Text-generation collaborator.
//!
//! [`TextGenerator`] is the async trait the rewrite and quiz stages call.
//! [`ApiGenerator`] implements it against any OpenAI-compatible
//! `/v1/chat/completions` endpoint.  Connection details come from
//! [`GenerationConfig`]; nothing is hardcoded.
//!
//! Some models reject optional sampling parameters.  `ApiGenerator`
//! tolerates that by retrying with a reduced parameter set — first
//! dropping `temperature`, then `max_tokens` — before failing with
//! [`GenerationError::UnsupportedParameter`].

use async_trait::async_trait;
use thiserror::Error;

use crate::config::GenerationConfig;
use crate::retry::Recoverable;

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

/// One message in a chat-completions request.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationError
// ---------------------------------------------------------------------------

/// Errors from the text-generation collaborator.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// HTTP transport error or upstream 5xx.
    #[error("generation request failed: {0}")]
    Http(String),

    /// The request did not complete within the configured timeout.
    #[error("generation request timed out")]
    Timeout,

    /// Upstream rate limit (HTTP 429).
    #[error("generation rate-limited by upstream")]
    RateLimited,

    /// Authentication or authorization failure (HTTP 401/403).
    #[error("generation authentication failed: {0}")]
    Auth(String),

    /// The upstream rejected the request as malformed (HTTP 4xx).
    #[error("generation request rejected: {0}")]
    Rejected(String),

    /// The model rejected an optional parameter even after the reduced
    /// parameter sets were tried.
    #[error("model rejected parameter after fallbacks: {0}")]
    UnsupportedParameter(String),

    /// The response body could not be parsed as expected JSON.
    #[error("failed to parse generation response: {0}")]
    Parse(String),

    /// The model returned a response with no usable text content.
    #[error("generation returned an empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerationError::Timeout
        } else {
            GenerationError::Http(e.to_string())
        }
    }
}

impl Recoverable for GenerationError {
    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GenerationError::Http(_) | GenerationError::Timeout | GenerationError::RateLimited
        )
    }
}

// ---------------------------------------------------------------------------
// TextGenerator trait
// ---------------------------------------------------------------------------

/// Async interface for text generation.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn TextGenerator>` across the rewrite and quiz stages.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run the chat completion and return the assistant's text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError>;
}

// ---------------------------------------------------------------------------
// Parameter fallback
// ---------------------------------------------------------------------------

/// Which optional sampling parameters to include in a request attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamSet {
    /// temperature + max_tokens (as configured).
    Full,
    /// max_tokens only.
    NoTemperature,
    /// Neither optional parameter.
    Minimal,
}

impl ParamSet {
    fn reduced(self) -> Option<ParamSet> {
        match self {
            ParamSet::Full => Some(ParamSet::NoTemperature),
            ParamSet::NoTemperature => Some(ParamSet::Minimal),
            ParamSet::Minimal => None,
        }
    }
}

/// Does this 400 body complain about an optional sampling parameter?
fn rejects_optional_parameter(body: &str) -> bool {
    let body = body.to_lowercase();
    body.contains("temperature") || body.contains("max_tokens")
}

// ---------------------------------------------------------------------------
// ApiGenerator
// ---------------------------------------------------------------------------

/// Calls an OpenAI-compatible `/v1/chat/completions` endpoint.
///
/// The `Authorization: Bearer …` header is attached only when the
/// configured API key is non-empty, so local providers that require no
/// authentication work unchanged.
pub struct ApiGenerator {
    client: reqwest::Client,
    config: GenerationConfig,
}

impl ApiGenerator {
    /// Build an `ApiGenerator` from configuration.  The HTTP client
    /// carries the per-request timeout from `config.timeout_secs`.
    pub fn from_config(config: &GenerationConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    fn build_body(&self, messages: &[ChatMessage], params: ParamSet) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model":    self.config.model,
            "messages": messages,
            "stream":   false,
        });

        if params == ParamSet::Full {
            if let Some(temperature) = self.config.temperature {
                body["temperature"] = serde_json::json!(temperature);
            }
        }
        if matches!(params, ParamSet::Full | ParamSet::NoTemperature) {
            if let Some(max_tokens) = self.config.max_tokens {
                body["max_tokens"] = serde_json::json!(max_tokens);
            }
        }

        body
    }

    async fn attempt(
        &self,
        messages: &[ChatMessage],
        params: ParamSet,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);

        let mut req = self.client.post(&url).json(&self.build_body(messages, params));

        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => GenerationError::Auth(body),
                429 => GenerationError::RateLimited,
                400 if rejects_optional_parameter(&body) => {
                    GenerationError::UnsupportedParameter(body)
                }
                400..=499 => GenerationError::Rejected(body),
                _ => GenerationError::Http(format!("upstream returned {status}: {body}")),
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;

        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(GenerationError::EmptyResponse)?
            .trim()
            .to_string();

        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for ApiGenerator {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let mut params = ParamSet::Full;

        loop {
            match self.attempt(messages, params).await {
                Err(GenerationError::UnsupportedParameter(detail)) => match params.reduced() {
                    Some(reduced) => {
                        log::warn!(
                            "generation: model rejected optional parameter, retrying with {reduced:?}: {detail}"
                        );
                        params = reduced;
                    }
                    None => return Err(GenerationError::UnsupportedParameter(detail)),
                },
                result => return result,
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

    fn make_config() -> GenerationConfig {
        GenerationConfig {
            base_url: "http://localhost:11434".into(),
            api_key: Some("sk-test".into()),
            model: "gpt-4o-mini".into(),
            temperature: Some(0.2),
            max_tokens: Some(4_000),
            timeout_secs: 120,
        }
    }

    #[test]
    fn from_config_builds_without_panic() {
        let _generator = ApiGenerator::from_config(&make_config());
    }

    /// Verify that `ApiGenerator` is usable as `dyn TextGenerator`.
    #[test]
    fn generator_is_object_safe() {
        let generator: Box<dyn TextGenerator> = Box::new(ApiGenerator::from_config(&make_config()));
        drop(generator);
    }

    // ---- parameter fallback order ---

    #[test]
    fn param_sets_reduce_in_documented_order() {
        assert_eq!(ParamSet::Full.reduced(), Some(ParamSet::NoTemperature));
        assert_eq!(ParamSet::NoTemperature.reduced(), Some(ParamSet::Minimal));
        assert_eq!(ParamSet::Minimal.reduced(), None);
    }

    #[test]
    fn rejects_optional_parameter_matches_param_names() {
        assert!(rejects_optional_parameter(
            r#"{"error":{"message":"Unsupported value: 'temperature'"}}"#
        ));
        assert!(rejects_optional_parameter(
            r#"{"error":{"message":"Unsupported parameter: 'max_tokens'"}}"#
        ));
        assert!(!rejects_optional_parameter(
            r#"{"error":{"message":"missing field 'messages'"}}"#
        ));
    }

    // ---- request body shape ---

    #[test]
    fn full_body_carries_both_optional_parameters() {
        let generator = ApiGenerator::from_config(&make_config());
        let body = generator.build_body(&[ChatMessage::user("hi")], ParamSet::Full);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(body["max_tokens"], 4_000);
    }

    #[test]
    fn no_temperature_body_drops_only_temperature() {
        let generator = ApiGenerator::from_config(&make_config());
        let body = generator.build_body(&[ChatMessage::user("hi")], ParamSet::NoTemperature);

        assert!(body.get("temperature").is_none());
        assert_eq!(body["max_tokens"], 4_000);
    }

    #[test]
    fn minimal_body_drops_both_optional_parameters() {
        let generator = ApiGenerator::from_config(&make_config());
        let body = generator.build_body(&[ChatMessage::user("hi")], ParamSet::Minimal);

        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn unset_temperature_is_never_sent() {
        let mut config = make_config();
        config.temperature = None;
        let generator = ApiGenerator::from_config(&config);

        let body = generator.build_body(&[ChatMessage::user("hi")], ParamSet::Full);
        assert!(body.get("temperature").is_none());
    }

    // ---- error classification ---

    #[test]
    fn transient_errors_are_recoverable() {
        assert!(GenerationError::Http("connection reset".into()).is_recoverable());
        assert!(GenerationError::Timeout.is_recoverable());
        assert!(GenerationError::RateLimited.is_recoverable());
    }

    #[test]
    fn permanent_errors_are_not_recoverable() {
        assert!(!GenerationError::Auth("401".into()).is_recoverable());
        assert!(!GenerationError::Rejected("bad request".into()).is_recoverable());
        assert!(!GenerationError::UnsupportedParameter("temperature".into()).is_recoverable());
        assert!(!GenerationError::Parse("bad json".into()).is_recoverable());
        assert!(!GenerationError::EmptyResponse.is_recoverable());
    }

    // ---- ChatMessage ---

    #[test]
    fn chat_message_constructors_set_roles() {
        assert_eq!(ChatMessage::system("s").role, "system");
        assert_eq!(ChatMessage::user("u").role, "user");
    }
}
