//! Enumeration types for the Traitors game.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Roles and factions
// ---------------------------------------------------------------------------

/// A participant's secret role. Assigned once at game start, never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Minority role; knows every other Traitor and murders at night.
    Traitor,
    /// Majority role; knows nobody's role but their own.
    Faithful,
}

impl Role {
    /// The faction this role plays for.
    pub const fn faction(self) -> Faction {
        match self {
            Self::Traitor => Faction::Traitors,
            Self::Faithful => Faction::Faithfuls,
        }
    }

    /// Lowercase name used in prompts and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Traitor => "traitor",
            Self::Faithful => "faithful",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A side that can win the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Faction {
    /// All Traitors, living or dead.
    Traitors,
    /// All Faithfuls, living or dead.
    Faithfuls,
}

impl Faction {
    /// Whether a participant holding `role` belongs to this faction.
    pub const fn includes(self, role: Role) -> bool {
        matches!(
            (self, role),
            (Self::Traitors, Role::Traitor) | (Self::Faithfuls, Role::Faithful)
        )
    }
}

impl core::fmt::Display for Faction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Traitors => f.write_str("traitors"),
            Self::Faithfuls => f.write_str("faithfuls"),
        }
    }
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// A state of the game's phase machine.
///
/// The machine moves `Night -> DayDiscussion -> RoundTableVote ->
/// Banishment -> WinCheck` and then either loops back to `Night` with the
/// round index incremented or stops at `Terminal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Traitors deliberate privately and vote on a murder.
    Night,
    /// The murder is revealed and every living participant speaks once.
    DayDiscussion,
    /// Every living participant casts a secret banishment vote.
    RoundTableVote,
    /// Votes are revealed and tallied; the plurality target is banished.
    Banishment,
    /// Terminal conditions are evaluated.
    WinCheck,
    /// Absorbing end state.
    Terminal,
}

impl Phase {
    /// Position of this phase within a round (0-based).
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::Night => 0,
            Self::DayDiscussion => 1,
            Self::RoundTableVote => 2,
            Self::Banishment => 3,
            Self::WinCheck => 4,
            Self::Terminal => 5,
        }
    }

    /// Upper-case label used in prompts and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Night => "NIGHT",
            Self::DayDiscussion => "DAY_DISCUSSION",
            Self::RoundTableVote => "ROUND_TABLE_VOTE",
            Self::Banishment => "BANISHMENT",
            Self::WinCheck => "WIN_CHECK",
            Self::Terminal => "TERMINAL",
        }
    }
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Actions and eliminations
// ---------------------------------------------------------------------------

/// The kind of decision an agent is asked to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// A message in the Traitors' private night channel.
    TraitorMessage,
    /// A Traitor's vote for tonight's murder victim.
    MurderVote,
    /// A message to one other player in a private daytime conversation.
    PrivateMessage,
    /// A public statement during day discussion.
    DiscussionStatement,
    /// A secret vote at the Round Table.
    BanishmentVote,
}

impl ActionKind {
    /// Whether this decision names a target (as opposed to free text).
    pub const fn is_vote(self) -> bool {
        matches!(self, Self::MurderVote | Self::BanishmentVote)
    }

    /// `snake_case` name used in prompts and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TraitorMessage => "traitor_message",
            Self::MurderVote => "murder_vote",
            Self::PrivateMessage => "private_message",
            Self::DiscussionStatement => "discussion_statement",
            Self::BanishmentVote => "banishment_vote",
        }
    }
}

impl core::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a participant left the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EliminationCause {
    /// Killed by the Traitors at night.
    Murdered,
    /// Voted out at the Round Table.
    Banished,
}

impl core::fmt::Display for EliminationCause {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Murdered => f.write_str("murdered"),
            Self::Banished => f.write_str("banished"),
        }
    }
}

/// Lifecycle state of a game run, as reported by `status()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Roles are assigned but no phase has run yet.
    NotStarted,
    /// The phase machine has started and not yet reached `Terminal`.
    Running,
    /// `Terminal` was reached and a result exists.
    Completed,
    /// An engine invariant was violated; no result will be produced.
    Failed,
    /// Cancelled externally between phases; no result will be produced.
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_ordinals_follow_round_order() {
        let order = [
            Phase::Night,
            Phase::DayDiscussion,
            Phase::RoundTableVote,
            Phase::Banishment,
            Phase::WinCheck,
            Phase::Terminal,
        ];
        for pair in order.windows(2) {
            if let [a, b] = pair {
                assert!(a.ordinal() < b.ordinal());
            }
        }
    }

    #[test]
    fn roles_map_to_factions() {
        assert_eq!(Role::Traitor.faction(), Faction::Traitors);
        assert!(Faction::Faithfuls.includes(Role::Faithful));
        assert!(!Faction::Faithfuls.includes(Role::Traitor));
    }

    #[test]
    fn phase_serializes_screaming_snake() {
        let json = serde_json::to_string(&Phase::RoundTableVote).ok();
        assert_eq!(json.as_deref(), Some("\"ROUND_TABLE_VOTE\""));
    }
}
