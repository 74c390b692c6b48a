//! The per-agent decision protocol.
//!
//! For one participant and one decision kind the protocol renders a prompt,
//! calls the participant's model under a timeout, and parses the response.
//! A failed attempt (malformed output, illegal target, backend error or
//! timeout) is retried with a corrective follow-up until the retry bound is
//! reached. Every attempt is reported back as an [`Exchange`] so the caller
//! can commit it to the transcript before the phase continues.
//!
//! The protocol never fails because of what a model said. A participant who
//! never produces a usable answer ends with a [`DecisionParseError`], which
//! [`DecisionReport::into_parts`] turns into an abstention.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, warn};
use traitors_types::{ActionKind, ActionPayload, AttemptOutcome, ParticipantId, Phase, Role};

use crate::capability::{ModelCapability, ModelCatalog, ModelRequest};
use crate::error::{DecisionParseError, GameError, IllegalPhaseError};
use crate::parse::{ResponseRules, parse_response, response_schema};
use crate::prompt::{PromptContext, PromptEngine};
use crate::transcript::Exchange;

/// One decision to be made by one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRequest {
    /// The acting participant.
    pub participant: ParticipantId,
    /// Their role.
    pub role: Role,
    /// Their model reference.
    pub model: String,
    /// Round index.
    pub round: u32,
    /// Current phase.
    pub phase: Phase,
    /// What is being decided.
    pub kind: ActionKind,
    /// Legal targets for a vote; empty for statements.
    pub candidates: Vec<ParticipantId>,
    /// Every participant with their alive flag.
    pub roster: Vec<(ParticipantId, bool)>,
    /// Template variables for the prompt.
    pub context: PromptContext,
}

/// A decision that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// The validated payload.
    pub payload: ActionPayload,
    /// The response it was parsed from.
    pub raw_response: String,
}

/// What happened while deciding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionReport {
    /// The acting participant.
    pub participant: ParticipantId,
    /// Decision kind.
    pub kind: ActionKind,
    /// The decision, or why none was reached.
    pub outcome: Result<Decision, DecisionParseError>,
    /// Every attempt in order, ready to be appended to the transcript.
    pub attempts: Vec<Exchange>,
}

impl DecisionReport {
    /// Split into the payload to record, the raw response it came from,
    /// and the attempts.
    ///
    /// A failed decision becomes an abstention carrying the failure, paired
    /// with the last response received, if any.
    pub fn into_parts(self) -> (ActionPayload, Option<String>, Vec<Exchange>) {
        match self.outcome {
            Ok(decision) => (decision.payload, Some(decision.raw_response), self.attempts),
            Err(error) => {
                let raw = self.attempts.iter().rev().find_map(|a| a.response.clone());
                (
                    ActionPayload::Abstain {
                        reason: error.to_string(),
                    },
                    raw,
                    self.attempts,
                )
            }
        }
    }

    /// Whether the participant failed to decide.
    pub const fn is_forced_default(&self) -> bool {
        self.outcome.is_err()
    }
}

/// Runs decisions against the model catalog.
#[derive(Debug, Clone)]
pub struct DecisionProtocol {
    prompts: Arc<PromptEngine>,
    catalog: ModelCatalog,
    retry_bound: u32,
    timeout: Duration,
    max_statement_chars: usize,
    max_concurrent: usize,
}

impl DecisionProtocol {
    /// Create a protocol.
    pub fn new(
        prompts: Arc<PromptEngine>,
        catalog: ModelCatalog,
        retry_bound: u32,
        timeout: Duration,
        max_statement_chars: usize,
        max_concurrent: usize,
    ) -> Self {
        Self {
            prompts,
            catalog,
            retry_bound: retry_bound.max(1),
            timeout,
            max_statement_chars,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// The model catalog in use.
    pub const fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Statement length limit.
    pub const fn max_statement_chars(&self) -> usize {
        self.max_statement_chars
    }

    /// Obtain one decision.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::IllegalPhase`] if a vote is requested with no
    /// candidates or the participant's model does not resolve, and
    /// [`GameError::Prompt`] if a prompt cannot be rendered. The model is
    /// not invoked in either case.
    pub async fn decide(&self, request: &DecisionRequest) -> Result<DecisionReport, GameError> {
        if request.kind.is_vote() && request.candidates.is_empty() {
            return Err(illegal(request, format!("{} requested with no candidates", request.kind)).into());
        }
        let model = self.catalog.get(&request.model).ok_or_else(|| {
            illegal(request, format!("model {:?} is not in the catalog", request.model))
        })?;

        let schema = response_schema(request.kind, &request.candidates, self.max_statement_chars);
        let schema_text = serde_json::to_string_pretty(&schema).unwrap_or_else(|_| schema.to_string());
        let mut context = request.context.clone();
        context.schema.clone_from(&schema_text);
        context.candidates = request.candidates.iter().map(ToString::to_string).collect();
        let rendered = self.prompts.render(request.kind, &context)?;

        let rules = ResponseRules {
            kind: request.kind,
            candidates: &request.candidates,
            roster: &request.roster,
            max_statement_chars: self.max_statement_chars,
        };

        let mut attempts = Vec::new();
        let mut last_problem: Option<String> = None;

        for attempt in 1..=self.retry_bound {
            let prompt = match &last_problem {
                None => rendered.user.clone(),
                Some(problem) => {
                    let correction =
                        self.prompts
                            .render_correction(problem, &schema_text, &context.candidates)?;
                    format!("{}\n\n{correction}", rendered.user)
                }
            };

            let model_request = ModelRequest {
                participant: request.participant.clone(),
                model: request.model.clone(),
                round: request.round,
                phase: request.phase,
                kind: request.kind,
                candidates: request.candidates.clone(),
                schema: schema.clone(),
                system: rendered.system.clone(),
                prompt,
                attempt,
            };

            let (response, outcome, payload) = self.attempt(model.as_ref(), &model_request, &rules).await;

            debug!(
                participant = %request.participant,
                kind = %request.kind,
                attempt,
                outcome = ?outcome,
                "decision attempt finished"
            );

            let problem = describe_failure(&outcome);
            attempts.push(Exchange {
                participant: request.participant.clone(),
                round: request.round,
                phase: request.phase,
                kind: request.kind,
                attempt,
                system_prompt: model_request.system,
                prompt: model_request.prompt,
                response: response.clone(),
                outcome,
            });

            if let (Some(payload), Some(raw_response)) = (payload, response) {
                return Ok(DecisionReport {
                    participant: request.participant.clone(),
                    kind: request.kind,
                    outcome: Ok(Decision {
                        payload,
                        raw_response,
                    }),
                    attempts,
                });
            }

            warn!(
                participant = %request.participant,
                kind = %request.kind,
                attempt,
                retry_bound = self.retry_bound,
                problem = problem.as_deref().unwrap_or_default(),
                "decision attempt failed"
            );
            last_problem = problem;
        }

        let error = DecisionParseError {
            participant: request.participant.clone(),
            kind: request.kind,
            attempts: self.retry_bound,
            last_reason: last_problem.unwrap_or_default(),
        };
        warn!(
            participant = %request.participant,
            kind = %request.kind,
            error = %error,
            "no valid decision, recording abstention"
        );
        Ok(DecisionReport {
            participant: request.participant.clone(),
            kind: request.kind,
            outcome: Err(error),
            attempts,
        })
    }

    /// Obtain decisions for many participants concurrently.
    ///
    /// At most `max_concurrent` model calls are in flight. Outcomes come
    /// back in the order of `requests`, whatever order the models answer in.
    /// One request failing does not discard the others, so their exchanges
    /// can still be recorded.
    pub async fn decide_all(&self, requests: &[DecisionRequest]) -> Vec<Result<DecisionReport, GameError>> {
        futures::stream::iter(requests.iter().map(|request| self.decide(request)))
            .buffered(self.max_concurrent)
            .collect()
            .await
    }
}

impl DecisionProtocol {
    /// One model call under the timeout, parsed against `rules`.
    async fn attempt(
        &self,
        model: &dyn ModelCapability,
        request: &ModelRequest,
        rules: &ResponseRules<'_>,
    ) -> (Option<String>, AttemptOutcome, Option<ActionPayload>) {
        match tokio::time::timeout(self.timeout, model.generate(request)).await {
            Err(_elapsed) => (
                None,
                AttemptOutcome::TimedOut {
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                },
                None,
            ),
            Ok(Err(error)) => (
                None,
                AttemptOutcome::BackendError {
                    message: error.to_string(),
                },
                None,
            ),
            Ok(Ok(text)) => match parse_response(&text, rules) {
                Ok(payload) => (Some(text), AttemptOutcome::Accepted, Some(payload)),
                Err(error) => (
                    Some(text),
                    AttemptOutcome::Rejected {
                        reason: error.to_string(),
                    },
                    None,
                ),
            },
        }
    }
}

fn illegal(request: &DecisionRequest, reason: String) -> IllegalPhaseError {
    IllegalPhaseError {
        phase: request.phase,
        round: request.round,
        reason,
    }
}

/// Text fed back to the model on retry.
fn describe_failure(outcome: &AttemptOutcome) -> Option<String> {
    match outcome {
        AttemptOutcome::Accepted => None,
        AttemptOutcome::Rejected { reason } => Some(reason.clone()),
        AttemptOutcome::TimedOut { timeout_ms } => {
            Some(format!("no answer within {timeout_ms} ms"))
        }
        AttemptOutcome::BackendError { message } => Some(message.clone()),
    }
}
