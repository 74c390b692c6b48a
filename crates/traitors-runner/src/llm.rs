//! LLM backends behind the engine's model capability.
//!
//! Concrete implementations exist for OpenAI-compatible APIs and the
//! Anthropic Messages API, dispatched through one enum. All backends talk
//! HTTP via `reqwest`. The engine owns timeouts and retries; a backend makes
//! exactly one request per call and reports any failure as
//! [`ModelError::Backend`].

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use traitors_core::{ModelCapability, ModelCatalog, ModelError, ModelRequest};

use crate::config::{BackendType, LlmBackendConfig, api_key};
use crate::error::RunnerError;

// ---------------------------------------------------------------------------
// Unified backend enum
// ---------------------------------------------------------------------------

/// An LLM backend that turns a rendered prompt into response text.
#[derive(Debug)]
pub enum LlmBackend {
    /// OpenAI-compatible chat completions API.
    OpenAi(OpenAiBackend),
    /// Anthropic Messages API.
    Anthropic(AnthropicBackend),
}

impl LlmBackend {
    /// Send the request's prompts and return the response text.
    pub async fn complete(&self, request: &ModelRequest) -> Result<String, RunnerError> {
        match self {
            Self::OpenAi(backend) => backend.complete(request).await,
            Self::Anthropic(backend) => backend.complete(request).await,
        }
    }

    /// Human-readable name for logging.
    pub const fn name(&self) -> &str {
        match self {
            Self::OpenAi(_) => "openai-compatible",
            Self::Anthropic(_) => "anthropic",
        }
    }
}

impl ModelCapability for LlmBackend {
    fn generate<'a>(&'a self, request: &'a ModelRequest) -> BoxFuture<'a, Result<String, ModelError>> {
        Box::pin(async move {
            self.complete(request).await.map_err(|e| ModelError::Backend {
                message: e.to_string(),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible backend
// ---------------------------------------------------------------------------

/// Backend for OpenAI-compatible chat completions APIs.
///
/// Sends requests to `{api_url}/chat/completions` and asks for a JSON
/// object response.
#[derive(Debug)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiBackend {
    /// Create a new `OpenAI`-compatible backend.
    pub fn new(config: &LlmBackendConfig, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        }
    }

    async fn complete(&self, request: &ModelRequest) -> Result<String, RunnerError> {
        let url = format!("{}/chat/completions", self.api_url);
        let body = openai_body(&self.model, self.max_tokens, request);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RunnerError::LlmBackend(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("unable to read error body: {e}"));
            return Err(RunnerError::LlmBackend(format!(
                "OpenAI returned {status}: {error_body}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RunnerError::LlmBackend(format!("OpenAI response parse failed: {e}")))?;

        extract_openai_content(&json)
    }
}

fn openai_body(model: &str, max_tokens: u32, request: &ModelRequest) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [
            {"role": "system", "content": request.system},
            {"role": "user", "content": request.prompt}
        ],
        "temperature": 0.7,
        "max_tokens": max_tokens,
        "response_format": {"type": "json_object"}
    })
}

/// Extract the text content from an `OpenAI` chat completions response.
fn extract_openai_content(json: &serde_json::Value) -> Result<String, RunnerError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            RunnerError::LlmBackend(
                "OpenAI response missing choices[0].message.content".to_owned(),
            )
        })
}

// ---------------------------------------------------------------------------
// Anthropic Messages API backend
// ---------------------------------------------------------------------------

/// Backend for the Anthropic Messages API.
///
/// Anthropic uses a different request format from `OpenAI`:
/// - Uses `x-api-key` header instead of `Authorization: Bearer`
/// - System prompt is a top-level field, not a message
/// - Response structure differs: `content[0].text`
#[derive(Debug)]
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicBackend {
    /// Create a new Anthropic Messages API backend.
    pub fn new(config: &LlmBackendConfig, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        }
    }

    async fn complete(&self, request: &ModelRequest) -> Result<String, RunnerError> {
        let url = format!("{}/messages", self.api_url);
        let body = anthropic_body(&self.model, self.max_tokens, request);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RunnerError::LlmBackend(format!("Anthropic request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("unable to read error body: {e}"));
            return Err(RunnerError::LlmBackend(format!(
                "Anthropic returned {status}: {error_body}"
            )));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            RunnerError::LlmBackend(format!("Anthropic response parse failed: {e}"))
        })?;

        extract_anthropic_content(&json)
    }
}

fn anthropic_body(model: &str, max_tokens: u32, request: &ModelRequest) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "max_tokens": max_tokens,
        "system": request.system,
        "messages": [
            {"role": "user", "content": request.prompt}
        ]
    })
}

/// Extract the text content from an Anthropic Messages API response.
fn extract_anthropic_content(json: &serde_json::Value) -> Result<String, RunnerError> {
    json.get("content")
        .and_then(|c| c.get(0))
        .and_then(|b| b.get("text"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            RunnerError::LlmBackend("Anthropic response missing content[0].text".to_owned())
        })
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Create an LLM backend from configuration and its API key.
pub fn create_backend(config: &LlmBackendConfig, api_key: String) -> LlmBackend {
    match config.backend_type {
        BackendType::OpenAi => LlmBackend::OpenAi(OpenAiBackend::new(config, api_key)),
        BackendType::Anthropic => LlmBackend::Anthropic(AnthropicBackend::new(config, api_key)),
    }
}

/// Build the model catalog for a bench, reading each backend's API key.
pub fn build_catalog(models: &BTreeMap<String, LlmBackendConfig>) -> Result<ModelCatalog, RunnerError> {
    let mut entries: Vec<(String, Arc<dyn ModelCapability>)> = Vec::with_capacity(models.len());
    for (reference, config) in models {
        let backend = create_backend(config, api_key(config)?);
        tracing::info!(
            reference = reference.as_str(),
            backend = backend.name(),
            model = config.model,
            "LLM backend configured"
        );
        entries.push((reference.clone(), Arc::new(backend)));
    }
    Ok(ModelCatalog::new(entries))
}
