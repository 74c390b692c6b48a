//! Bench configuration for the runner.
//!
//! A bench file is YAML. It embeds one game configuration, which every game
//! in the run shares, plus the model backends participants refer to by
//! name. API keys are never stored in the file: each backend names the
//! environment variable that holds its key.
//!
//! ```yaml
//! games: 20
//! max_parallel_games: 4
//! output_dir: results
//! models:
//!   gpt:
//!     backend_type: openai
//!     api_url: https://api.openai.com/v1
//!     api_key_env: OPENAI_API_KEY
//!     model: gpt-4o-mini
//! game:
//!   traitor_count: 1
//!   participants:
//!     - { name: Alice, model: gpt }
//!     - { name: Bob, model: gpt }
//!     - { name: Carol, model: gpt }
//!     - { name: Dave, model: gpt }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use traitors_core::GameConfig;

use crate::error::RunnerError;

/// Complete bench configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// The game every run plays.
    pub game: GameConfig,

    /// Model backends by reference name.
    pub models: BTreeMap<String, LlmBackendConfig>,

    /// Number of games to play.
    #[serde(default = "default_games")]
    pub games: u32,

    /// Games played at the same time.
    #[serde(default = "default_max_parallel_games")]
    pub max_parallel_games: usize,

    /// Directory results are written under, one subdirectory per game.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory of `.j2` templates overriding the built-in prompts.
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
}

/// Configuration for a single LLM backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmBackendConfig {
    /// The backend type.
    pub backend_type: BackendType,
    /// Base API URL (e.g. `https://api.openai.com/v1`).
    pub api_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Model identifier sent to the API.
    pub model: String,
    /// Response token limit.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// Supported LLM backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// `OpenAI`-compatible API (works with `OpenAI`, `DeepSeek`, Ollama).
    #[serde(alias = "deepseek", alias = "ollama")]
    OpenAi,
    /// Anthropic Messages API (different request format).
    #[serde(alias = "claude")]
    Anthropic,
}

impl BenchConfig {
    /// Load and validate a bench file.
    pub fn from_file(path: &Path) -> Result<Self, RunnerError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate bench YAML.
    pub fn parse(yaml: &str) -> Result<Self, RunnerError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the embedded game and that every participant's model has a
    /// backend.
    pub fn validate(&self) -> Result<(), RunnerError> {
        self.game.validate()?;
        if self.games < 1 {
            return Err(RunnerError::Config("games must be at least 1".to_owned()));
        }
        if self.max_parallel_games < 1 {
            return Err(RunnerError::Config(
                "max_parallel_games must be at least 1".to_owned(),
            ));
        }
        for participant in &self.game.participants {
            if !self.models.contains_key(&participant.model) {
                return Err(RunnerError::Config(format!(
                    "participant {} uses model {:?}, which has no backend",
                    participant.name, participant.model
                )));
            }
        }
        Ok(())
    }

    /// Game configuration for the `index`-th game. With a fixed seed every
    /// game gets its own seed derived from it, so the run is reproducible
    /// without every game drawing the same roles.
    pub fn game_for(&self, index: u32) -> GameConfig {
        let mut game = self.game.clone();
        game.seed = self.game.seed.map(|seed| seed.wrapping_add(u64::from(index)));
        game
    }
}

/// Read a backend's API key from its environment variable.
pub fn api_key(config: &LlmBackendConfig) -> Result<String, RunnerError> {
    std::env::var(&config.api_key_env).map_err(|e| {
        RunnerError::Config(format!(
            "missing API key env var {} for model {}: {e}",
            config.api_key_env, config.model
        ))
    })
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const fn default_games() -> u32 {
    1
}

const fn default_max_parallel_games() -> usize {
    4
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

const fn default_max_tokens() -> u32 {
    512
}
