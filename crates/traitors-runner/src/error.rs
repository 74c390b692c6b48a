//! Error types for the benchmark runner.
//!
//! Uses `thiserror` for typed errors that surface through the runner:
//! bench configuration, LLM calls, and writing results.

use traitors_core::{ConfigError, GameError};

/// Errors that can occur while running a benchmark.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The bench configuration is invalid or incomplete.
    #[error("config error: {0}")]
    Config(String),

    /// The embedded game configuration was rejected.
    #[error(transparent)]
    Game(#[from] GameError),

    /// An LLM backend returned an error or was unreachable.
    #[error("LLM backend error: {0}")]
    LlmBackend(String),

    /// Reading configuration or writing results failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<ConfigError> for RunnerError {
    fn from(source: ConfigError) -> Self {
        Self::Game(GameError::Config { source })
    }
}

impl From<serde_yml::Error> for RunnerError {
    fn from(e: serde_yml::Error) -> Self {
        Self::Config(format!("failed to parse bench YAML: {e}"))
    }
}
