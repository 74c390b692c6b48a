//! The pluggable model capability and the catalog that resolves model
//! references to implementations.
//!
//! The engine never talks to a model directly. Each participant names a
//! model reference in its config; the [`ModelCatalog`] maps that reference
//! to an `Arc<dyn ModelCapability>`. The catalog is an immutable snapshot
//! shared by every game that uses it.
//!
//! Two in-crate capabilities exist for driving the engine without a
//! network: [`ScriptedModel`], which replays a fixed list of responses,
//! and [`FnModel`], which computes a response from the request.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use traitors_types::{ActionKind, ParticipantId, Phase};

/// Errors a model capability can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// The backend failed (network, HTTP status, malformed envelope).
    #[error("model backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// A scripted capability ran out of responses.
    #[error("scripted model has no response left for {participant}")]
    Exhausted {
        /// The participant whose request could not be answered.
        participant: ParticipantId,
    },
}

/// Everything a model needs to answer one decision attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// The participant being prompted.
    pub participant: ParticipantId,
    /// Model reference the participant is backed by.
    pub model: String,
    /// Round index.
    pub round: u32,
    /// Current phase.
    pub phase: Phase,
    /// Decision being requested.
    pub kind: ActionKind,
    /// Legal targets for a vote; empty for free-text decisions.
    pub candidates: Vec<ParticipantId>,
    /// JSON schema the response must satisfy.
    pub schema: serde_json::Value,
    /// System prompt.
    pub system: String,
    /// User prompt.
    pub prompt: String,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// A backing model that turns a prompt into text.
///
/// Implementations must be shareable across tasks. Output is untrusted and
/// always passes through the decision protocol's parser.
pub trait ModelCapability: Send + Sync {
    /// Produce a response for the request.
    fn generate<'a>(&'a self, request: &'a ModelRequest) -> BoxFuture<'a, Result<String, ModelError>>;
}

/// Immutable mapping from model reference to capability.
#[derive(Clone, Default)]
pub struct ModelCatalog {
    models: Arc<BTreeMap<String, Arc<dyn ModelCapability>>>,
}

impl core::fmt::Debug for ModelCatalog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModelCatalog")
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModelCatalog {
    /// Build a catalog from `(reference, capability)` pairs.
    pub fn new(
        models: impl IntoIterator<Item = (String, Arc<dyn ModelCapability>)>,
    ) -> Self {
        Self {
            models: Arc::new(models.into_iter().collect()),
        }
    }

    /// A catalog in which every listed reference resolves to the same
    /// capability.
    pub fn uniform<'a>(
        references: impl IntoIterator<Item = &'a str>,
        model: &Arc<dyn ModelCapability>,
    ) -> Self {
        Self::new(
            references
                .into_iter()
                .map(|r| (r.to_owned(), Arc::clone(model))),
        )
    }

    /// Resolve a model reference.
    pub fn get(&self, reference: &str) -> Option<Arc<dyn ModelCapability>> {
        self.models.get(reference).cloned()
    }

    /// Whether a reference resolves.
    pub fn contains(&self, reference: &str) -> bool {
        self.models.contains_key(reference)
    }

    /// Every known reference, sorted.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// In-crate capabilities
// ---------------------------------------------------------------------------

/// Replays a fixed sequence of responses, one per call, then fails with
/// [`ModelError::Exhausted`].
///
/// An optional delay is applied before every response, which makes it easy
/// to exercise the decision timeout.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    /// Create a model that answers with `responses` in order.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            delay: None,
        }
    }

    /// Wait `delay` before answering each call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ModelCapability for ScriptedModel {
    fn generate<'a>(&'a self, request: &'a ModelRequest) -> BoxFuture<'a, Result<String, ModelError>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .ok_or_else(|| ModelError::Exhausted {
                    participant: request.participant.clone(),
                })
        })
    }
}

/// Answers every call by invoking a closure on the request.
pub struct FnModel<F> {
    respond: F,
}

impl<F> FnModel<F>
where
    F: Fn(&ModelRequest) -> Result<String, ModelError> + Send + Sync,
{
    /// Wrap a closure as a model capability.
    pub const fn new(respond: F) -> Self {
        Self { respond }
    }
}

impl<F> core::fmt::Debug for FnModel<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("FnModel")
    }
}

impl<F> ModelCapability for FnModel<F>
where
    F: Fn(&ModelRequest) -> Result<String, ModelError> + Send + Sync,
{
    fn generate<'a>(&'a self, request: &'a ModelRequest) -> BoxFuture<'a, Result<String, ModelError>> {
        let response = (self.respond)(request);
        Box::pin(async move { response })
    }
}
