//! Application configuration.
//!
//! One explicit [`AppConfig`] tree, constructed once at process start and
//! passed into each adapter — no ambient global client state.

pub mod settings;

pub use settings::{
    AppConfig, DispatchConfig, DispatchStrategy, GenerationConfig, LedgerConfig, LockConfig,
    MailConfig, PipelineConfig, RenderConfig, RetryConfig, StorageConfig, TranscriptionConfig,
};
