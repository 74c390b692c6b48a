//! Terminal game result and status snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::{EliminationCause, Faction, Phase, Role, RunState};
use crate::ids::{GameId, ParticipantId};

/// How a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    /// One faction won.
    Winner {
        /// The winning faction.
        faction: Faction,
    },
    /// The round limit was reached with no winner.
    Draw,
}

impl Outcome {
    /// The winning faction, if any.
    pub const fn winner(self) -> Option<Faction> {
        match self {
            Self::Winner { faction } => Some(faction),
            Self::Draw => None,
        }
    }
}

impl core::fmt::Display for Outcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Winner { faction } => write!(f, "{faction} win"),
            Self::Draw => f.write_str("draw"),
        }
    }
}

/// Which terminal condition fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinReason {
    /// No living Traitors remain.
    AllTraitorsEliminated,
    /// Living Traitors reached parity with (or outnumbered) living Faithfuls.
    TraitorParity,
    /// The configured round limit was reached.
    MaxRoundsReached,
}

/// One entry in the ordered elimination history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Elimination {
    /// Round in which the elimination happened.
    pub round: u32,
    /// Murdered or banished.
    pub cause: EliminationCause,
    /// Who was eliminated.
    pub participant: ParticipantId,
    /// Their (secret) role.
    pub role: Role,
}

/// A participant's final standing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalStanding {
    /// The participant.
    pub participant: ParticipantId,
    /// Their role.
    pub role: Role,
    /// Backing model reference.
    pub model: String,
    /// Whether they survived to the end.
    pub alive: bool,
    /// How they left the game, if they did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eliminated: Option<EliminationCause>,
    /// Cumulative earnings.
    pub earnings: Decimal,
}

/// The terminal record of a completed game. Produced exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    /// The game this result belongs to.
    pub game_id: GameId,
    /// Winner or draw.
    pub outcome: Outcome,
    /// The terminal condition that fired.
    pub reason: WinReason,
    /// Number of rounds played (final round index + 1).
    pub rounds_played: u32,
    /// Murders and banishments in the order they happened.
    pub eliminations: Vec<Elimination>,
    /// Every participant in join order.
    pub standings: Vec<FinalStanding>,
    /// Traitors at game start, in join order.
    pub initial_traitors: Vec<ParticipantId>,
    /// Faithfuls at game start, in join order.
    pub initial_faithfuls: Vec<ParticipantId>,
    /// Seed used for role assignment (reproduces the same roles).
    pub role_seed: u64,
    /// When the first phase ran.
    pub started_at: DateTime<Utc>,
    /// When the terminal state was reached.
    pub finished_at: DateTime<Utc>,
}

impl GameResult {
    /// Participants belonging to the winning faction, if any.
    pub fn winners(&self) -> Vec<&ParticipantId> {
        let Some(faction) = self.outcome.winner() else {
            return Vec::new();
        };
        self.standings
            .iter()
            .filter(|s| faction.includes(s.role))
            .map(|s| &s.participant)
            .collect()
    }

    /// Final standing for one participant.
    pub fn standing(&self, participant: &ParticipantId) -> Option<&FinalStanding> {
        self.standings.iter().find(|s| &s.participant == participant)
    }
}

/// Snapshot returned by the controller's `status()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStatus {
    /// Current (or last) phase.
    pub phase: Phase,
    /// Current round index.
    pub round: u32,
    /// Lifecycle state.
    pub state: RunState,
}
