//! Settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and
//! `Clone` so they can be round-tripped through TOML files and shared
//! across tasks.  The config file path comes from the
//! `LECTUREPRESS_CONFIG` environment variable, defaulting to
//! `lecturepress.toml` in the working directory.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "LECTUREPRESS_CONFIG";

/// Default config file name in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "lecturepress.toml";

// ---------------------------------------------------------------------------
// DispatchStrategy / DispatchConfig
// ---------------------------------------------------------------------------

/// How a fulfillment run is executed after a payment confirmation.
///
/// Resolved once at startup from configuration, never re-derived per
/// call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DispatchStrategy {
    /// Enqueue a job on the durable Redis queue; a worker picks it up.
    Queue,
    /// Run the orchestrator on a detached background task in-process.
    InlineAsync,
}

impl Default for DispatchStrategy {
    fn default() -> Self {
        Self::InlineAsync
    }
}

/// Settings for the dispatch front.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub strategy: DispatchStrategy,
    /// Redis list name jobs are pushed onto (`Queue` strategy).
    pub queue_name: String,
    /// Redis URL for the queue; required by the `Queue` strategy.
    pub redis_url: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            strategy: DispatchStrategy::default(),
            queue_name: "fulfillment".into(),
            redis_url: None,
        }
    }
}

// ---------------------------------------------------------------------------
// LockConfig
// ---------------------------------------------------------------------------

/// Settings for the per-order distributed mutex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Redis URL of the coordination store.  `None` puts the lock in
    /// bypass mode (no mutual exclusion — single-instance deployments
    /// only).
    pub redis_url: Option<String>,
    /// Lock TTL; bounds a crashed run's hold on an order.
    pub ttl_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl_secs: 600,
        }
    }
}

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

/// Bounded-retry settings applied around every external call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 1_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: std::time::Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

// ---------------------------------------------------------------------------
// LedgerConfig
// ---------------------------------------------------------------------------

/// Settings for the order ledger gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".into(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

/// Settings for the object store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8091".into(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

// ---------------------------------------------------------------------------
// TranscriptionConfig
// ---------------------------------------------------------------------------

/// Settings for the polling speech-to-text collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub base_url: String,
    pub api_key: String,
    /// Seconds between status polls.
    pub poll_interval_secs: u64,
    /// Overall processing deadline; exceeding it fails the stage.
    pub deadline_secs: u64,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.assemblyai.com".into(),
            api_key: String::new(),
            poll_interval_secs: 5,
            deadline_secs: 600,
            request_timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationConfig
// ---------------------------------------------------------------------------

/// Settings for the text-generation collaborator (OpenAI-compatible
/// chat-completions endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Sampling temperature.  `None` omits the parameter entirely, which
    /// some models require.
    pub temperature: Option<f32>,
    /// Completion token cap.  `None` omits the parameter.
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: None,
            model: "gpt-4o-mini".into(),
            temperature: None,
            max_tokens: Some(4_000),
            timeout_secs: 120,
        }
    }
}

// ---------------------------------------------------------------------------
// MailConfig
// ---------------------------------------------------------------------------

/// Settings for the outbound email provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub base_url: String,
    pub api_key: String,
    pub from_address: String,
    pub timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8092".into(),
            api_key: String::new(),
            from_address: "orders@lecturepress.example".into(),
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// RenderConfig
// ---------------------------------------------------------------------------

/// Settings for the rendering/conversion collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8093".into(),
            timeout_secs: 120,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Settings for the fulfillment pipeline itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum words per transformation block.
    pub words_per_block: usize,
    /// Quiz items generated per detected section.
    pub quiz_per_section: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            words_per_block: 3_000,
            quiz_per_section: 7,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialized as TOML.
///
/// # Persistence
///
/// ```rust,no_run
/// use lecturepress::config::AppConfig;
///
/// // Load (returns Default when the file is missing)
/// let config = AppConfig::load().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dispatch: DispatchConfig,
    pub lock: LockConfig,
    pub retry: RetryConfig,
    pub ledger: LedgerConfig,
    pub storage: StorageConfig,
    pub transcription: TranscriptionConfig,
    pub generation: GenerationConfig,
    pub mail: MailConfig,
    pub render: RenderConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Load configuration from `$LECTUREPRESS_CONFIG`, falling back to
    /// `lecturepress.toml` in the working directory.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist,
    /// so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::load_from(std::path::Path::new(&path))
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
