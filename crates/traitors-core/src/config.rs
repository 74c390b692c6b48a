//! Configuration loading and typed config structures for a single game.
//!
//! A [`GameConfig`] is a flat set of options, loadable from YAML. Every
//! field except the participant list has a default, so the smallest valid
//! file is just a list of players:
//!
//! ```yaml
//! participants:
//!   - { name: Alice, model: gpt }
//!   - { name: Bob, model: claude }
//!   - { name: Carol, model: gpt }
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use traitors_types::ParticipantId;

use crate::error::ConfigError;

/// One seat at the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantConfig {
    /// Unique participant name, used as the participant id.
    pub name: String,
    /// Model reference, resolved through the model catalog.
    pub model: String,
}

impl ParticipantConfig {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
        }
    }
}

/// What happens when the Round Table vote is tied for the most votes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakPolicy {
    /// Nobody is banished this round.
    #[default]
    NoElimination,
    /// The tied candidate who received a vote earliest in voter join order
    /// is banished.
    FirstNominated,
    /// One revote restricted to the tied candidates; if that is tied too,
    /// nobody is banished.
    Revote,
    /// A tied candidate is drawn with an RNG seeded by the role seed and
    /// the round index.
    SeededRandom,
}

/// How winnings are paid out at the end of the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayoutPolicy {
    /// Every living member of the winning faction receives `amount`.
    PerSurvivor {
        /// Amount credited to each surviving winner.
        amount: Decimal,
    },
    /// The pool is split evenly among the living members of the winning
    /// faction.
    SplitPool {
        /// Total prize pool.
        pool: Decimal,
    },
}

impl Default for PayoutPolicy {
    fn default() -> Self {
        Self::PerSurvivor {
            amount: Decimal::ONE_HUNDRED,
        }
    }
}

/// How much of the transcript goes into each prompt.
///
/// Model calls carry no memory between prompts, so every window includes
/// at least the current round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextWindow {
    /// Records since the participant last acted, or since the start of the
    /// current round if that is earlier.
    SinceLastTurn,
    /// Every record the participant may see.
    #[default]
    Full,
}

/// Complete configuration of one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Participants in join order.
    pub participants: Vec<ParticipantConfig>,

    /// Number of Traitors to assign.
    #[serde(default = "default_traitor_count")]
    pub traitor_count: u32,

    /// Rounds after which the game ends in a draw.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Payout policy for the winning faction.
    #[serde(default)]
    pub payout: PayoutPolicy,

    /// Total attempts per decision, including the first.
    #[serde(default = "default_retry_bound")]
    pub retry_bound: u32,

    /// Milliseconds a single model call may take before it counts as a
    /// failed attempt.
    #[serde(default = "default_decision_timeout_ms")]
    pub decision_timeout_ms: u64,

    /// Statements longer than this many characters are truncated.
    #[serde(default = "default_max_statement_chars")]
    pub max_statement_chars: usize,

    /// Round Table tie handling.
    #[serde(default)]
    pub tie_break: TieBreakPolicy,

    /// Whether Traitors exchange private messages before the murder vote.
    #[serde(default = "default_true")]
    pub traitor_deliberation: bool,

    /// Private two-person conversations held each day before the public
    /// discussion. Capped by the number of living players; 0 disables them.
    #[serde(default)]
    pub private_conversations: u32,

    /// Upper bound on messages per private conversation. Each conversation
    /// draws its length from `1..=max_private_messages`.
    #[serde(default = "default_max_private_messages")]
    pub max_private_messages: u32,

    /// Whether a banished participant's role is announced.
    #[serde(default = "default_true")]
    pub reveal_banished_role: bool,

    /// Transcript window included in prompts.
    #[serde(default)]
    pub context_window: ContextWindow,

    /// Maximum model calls in flight during simultaneous votes.
    #[serde(default = "default_max_concurrent_decisions")]
    pub max_concurrent_decisions: usize,

    /// Minimum participants required per Traitor.
    #[serde(default = "default_min_participants_per_traitor")]
    pub min_participants_per_traitor: u32,

    /// Seed for role assignment. Random when absent; the seed actually used
    /// is recorded in the result.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl GameConfig {
    /// A configuration with the given participants and every other option
    /// at its default.
    pub fn with_participants(participants: Vec<ParticipantConfig>) -> Self {
        Self {
            participants,
            traitor_count: default_traitor_count(),
            max_rounds: default_max_rounds(),
            payout: PayoutPolicy::default(),
            retry_bound: default_retry_bound(),
            decision_timeout_ms: default_decision_timeout_ms(),
            max_statement_chars: default_max_statement_chars(),
            tie_break: TieBreakPolicy::default(),
            traitor_deliberation: true,
            private_conversations: 0,
            max_private_messages: default_max_private_messages(),
            reveal_banished_role: true,
            context_window: ContextWindow::default(),
            max_concurrent_decisions: default_max_concurrent_decisions(),
            min_participants_per_traitor: default_min_participants_per_traitor(),
            seed: None,
        }
    }

    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or a validation
    /// error from [`GameConfig::validate`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every structural constraint that does not depend on the model
    /// catalog.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let participants = self.participants.len();
        let traitors = usize::try_from(self.traitor_count).unwrap_or(usize::MAX);

        if self.traitor_count < 1 || traitors >= participants {
            return Err(ConfigError::TraitorCount {
                traitors: self.traitor_count,
                participants,
            });
        }

        let per_traitor = usize::try_from(self.min_participants_per_traitor).unwrap_or(usize::MAX);
        let minimum = traitors.saturating_mul(per_traitor);
        if participants < minimum {
            return Err(ConfigError::TooFewParticipants {
                participants,
                traitors: self.traitor_count,
                minimum,
            });
        }

        let mut seen = BTreeSet::new();
        for participant in &self.participants {
            if participant.name.trim().is_empty() {
                return Err(invalid("participant names must not be empty"));
            }
            if participant.model.trim().is_empty() {
                return Err(invalid(format!(
                    "participant {} has an empty model reference",
                    participant.name
                )));
            }
            if !seen.insert(participant.name.as_str()) {
                return Err(ConfigError::DuplicateParticipant(ParticipantId::new(
                    participant.name.as_str(),
                )));
            }
        }

        if self.max_rounds < 1 {
            return Err(invalid("max_rounds must be at least 1"));
        }
        if self.retry_bound < 1 {
            return Err(invalid("retry_bound must be at least 1"));
        }
        if self.decision_timeout_ms < 1 {
            return Err(invalid("decision_timeout_ms must be at least 1"));
        }
        if self.max_statement_chars < 1 {
            return Err(invalid("max_statement_chars must be at least 1"));
        }
        if self.max_concurrent_decisions < 1 {
            return Err(invalid("max_concurrent_decisions must be at least 1"));
        }
        if self.private_conversations > 0 && self.max_private_messages < 1 {
            return Err(invalid(
                "max_private_messages must be at least 1 when private conversations are enabled",
            ));
        }

        let payout_negative = match self.payout {
            PayoutPolicy::PerSurvivor { amount } => amount.is_sign_negative(),
            PayoutPolicy::SplitPool { pool } => pool.is_sign_negative(),
        };
        if payout_negative {
            return Err(invalid("payout must not be negative"));
        }

        Ok(())
    }

    /// Per-call model timeout.
    pub const fn decision_timeout(&self) -> Duration {
        Duration::from_millis(self.decision_timeout_ms)
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_traitor_count() -> u32 {
    1
}

const fn default_max_rounds() -> u32 {
    10
}

const fn default_retry_bound() -> u32 {
    3
}

const fn default_decision_timeout_ms() -> u64 {
    60_000
}

const fn default_max_statement_chars() -> usize {
    1_000
}

const fn default_max_concurrent_decisions() -> usize {
    8
}

const fn default_min_participants_per_traitor() -> u32 {
    2
}

const fn default_max_private_messages() -> u32 {
    5
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn players(n: usize) -> Vec<ParticipantConfig> {
        (0..n)
            .map(|i| ParticipantConfig::new(format!("P{i}"), "model"))
            .collect()
    }

    #[test]
    fn minimal_yaml_gets_defaults() {
        let yaml = "
participants:
  - { name: Alice, model: gpt }
  - { name: Bob, model: claude }
  - { name: Carol, model: gpt }
";
        let config = GameConfig::parse(yaml).unwrap();
        assert_eq!(config.traitor_count, 1);
        assert_eq!(config.retry_bound, 3);
        assert_eq!(config.tie_break, TieBreakPolicy::NoElimination);
        assert_eq!(
            config.payout,
            PayoutPolicy::PerSurvivor {
                amount: Decimal::ONE_HUNDRED
            }
        );
        assert!(config.traitor_deliberation);
        assert!(config.reveal_banished_role);
        assert_eq!(config.context_window, ContextWindow::Full);
        assert_eq!(config.private_conversations, 0);
        assert_eq!(config.max_private_messages, 5);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn yaml_overrides_policies() {
        let yaml = "
participants:
  - { name: A, model: m }
  - { name: B, model: m }
  - { name: C, model: m }
  - { name: D, model: m }
traitor_count: 2
tie_break: revote
payout: { type: split_pool, pool: 1000 }
context_window: since_last_turn
private_conversations: 2
max_private_messages: 3
seed: 7
";
        let config = GameConfig::parse(yaml).unwrap();
        assert_eq!(config.traitor_count, 2);
        assert_eq!(config.tie_break, TieBreakPolicy::Revote);
        assert_eq!(
            config.payout,
            PayoutPolicy::SplitPool {
                pool: Decimal::from(1000)
            }
        );
        assert_eq!(config.context_window, ContextWindow::SinceLastTurn);
        assert_eq!(config.private_conversations, 2);
        assert_eq!(config.max_private_messages, 3);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn traitor_count_must_leave_a_faithful() {
        let mut config = GameConfig::with_participants(players(3));
        config.traitor_count = 3;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TraitorCount { traitors: 3, .. })
        ));
        config.traitor_count = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TraitorCount { traitors: 0, .. })
        ));
    }

    #[test]
    fn too_many_traitors_per_participant() {
        let mut config = GameConfig::with_participants(players(5));
        config.traitor_count = 3;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooFewParticipants { minimum: 6, .. })
        ));
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut list = players(3);
        list.push(ParticipantConfig::new("P0", "other"));
        let config = GameConfig::with_participants(list);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateParticipant(_))
        ));
    }

    #[test]
    fn private_conversations_need_a_message_bound() {
        let mut config = GameConfig::with_participants(players(4));
        config.max_private_messages = 0;
        assert!(config.validate().is_ok());
        config.private_conversations = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn zero_retry_bound_rejected() {
        let mut config = GameConfig::with_participants(players(3));
        config.retry_bound = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn invalid_yaml_is_a_yaml_error() {
        let result = GameConfig::parse("participants: [unterminated");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }
}
