//! Error types for the game engine.
//!
//! The taxonomy separates caller mistakes from agent misbehaviour from
//! engine bugs:
//!
//! - [`ConfigError`] -- invalid setup; fatal, no game runs.
//! - [`DecisionParseError`] -- an agent never produced a schema-valid
//!   decision; degraded to an abstention, never fatal on its own.
//! - [`InvalidTargetError`] -- an action named an unknown or dead
//!   participant; a failed attempt inside the decision protocol, fatal only
//!   if it reaches the registry during resolution.
//! - [`IllegalPhaseError`] -- an engine invariant was violated; fatal.
//! - [`NotCompletedError`] -- a result was requested before `Terminal`.
//! - [`PromptError`] -- a prompt template failed to load or render; fatal.
//!
//! [`GameError`] aggregates them for the controller API.

use traitors_types::{ActionKind, Phase, ParticipantId, RunState};

/// Errors raised while loading or validating a game configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The traitor count is outside `1..participants`.
    #[error("traitor count {traitors} is invalid for {participants} participants")]
    TraitorCount {
        /// Requested traitor count.
        traitors: u32,
        /// Number of configured participants.
        participants: usize,
    },

    /// Too few participants for the requested traitor count.
    #[error(
        "{participants} participants is below the minimum of {minimum} for {traitors} traitors"
    )]
    TooFewParticipants {
        /// Number of configured participants.
        participants: usize,
        /// Requested traitor count.
        traitors: u32,
        /// Required minimum.
        minimum: usize,
    },

    /// Two participants share a name.
    #[error("duplicate participant name: {0}")]
    DuplicateParticipant(ParticipantId),

    /// A participant references a model the catalog does not provide.
    #[error("participant {participant} references unknown model {model:?}")]
    UnknownModel {
        /// The participant.
        participant: ParticipantId,
        /// The unresolved model reference.
        model: String,
    },

    /// Any other out-of-range or malformed option.
    #[error("invalid config: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Why a target was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetProblem {
    /// No participant has this id.
    Unknown,
    /// The participant exists but is already eliminated.
    AlreadyEliminated,
    /// The participant is alive but not a legal choice for this decision.
    NotACandidate,
}

impl core::fmt::Display for TargetProblem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unknown => f.write_str("is not a participant"),
            Self::AlreadyEliminated => f.write_str("is already eliminated"),
            Self::NotACandidate => f.write_str("is not a valid choice"),
        }
    }
}

/// An action referenced a non-existent, dead, or otherwise illegal target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid target {target:?}: {problem}")]
pub struct InvalidTargetError {
    /// The target as named.
    pub target: String,
    /// What is wrong with it.
    pub problem: TargetProblem,
}

/// An agent's output never became schema-valid within the retry bound.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{participant} gave no valid {kind} after {attempts} attempts: {last_reason}")]
pub struct DecisionParseError {
    /// The participant that failed to decide.
    pub participant: ParticipantId,
    /// The decision requested.
    pub kind: ActionKind,
    /// Attempts made (equals the retry bound).
    pub attempts: u32,
    /// Failure reason of the final attempt.
    pub last_reason: String,
}

/// An engine invariant was violated. Indicates a bug; the run fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal state in {phase} (round {round}): {reason}")]
pub struct IllegalPhaseError {
    /// Phase in which the violation was detected.
    pub phase: Phase,
    /// Round index.
    pub round: u32,
    /// Description of the violated invariant.
    pub reason: String,
}

/// A result was requested before the game reached `Terminal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("game has not completed (state: {state:?}, phase: {phase})")]
pub struct NotCompletedError {
    /// Current lifecycle state.
    pub state: RunState,
    /// Current phase.
    pub phase: Phase,
}

/// A prompt template failed to load or render.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("template error: {0}")]
pub struct PromptError(pub String);

/// Top-level error for the game controller.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// Configuration was rejected.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// An engine invariant was violated.
    #[error(transparent)]
    IllegalPhase(#[from] IllegalPhaseError),

    /// A target reached the registry without being valid.
    #[error(transparent)]
    InvalidTarget(#[from] InvalidTargetError),

    /// A result was requested too early.
    #[error(transparent)]
    NotCompleted(#[from] NotCompletedError),

    /// A prompt could not be rendered.
    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// The game was cancelled between phases.
    #[error("game was cancelled")]
    Cancelled,

    /// A recorded transcript could not be replayed.
    #[error("replay error: {reason}")]
    Replay {
        /// What made the transcript unusable.
        reason: String,
    },
}
