//! Append-only transcript records.
//!
//! A game's audit trail is a single ordered stream of [`Record`]s: every
//! prompt/response exchange with a model, every validated [`Action`], and
//! every engine announcement ([`GameEvent`]). Sequence numbers are assigned
//! by the transcript store on append and are strictly increasing across all
//! three kinds, so the stream can be replayed in exactly the order it was
//! produced.
//!
//! Every record carries a visibility scope. Prompts are built by filtering
//! the shared stream through [`Record::visible_to`] rather than by keeping
//! per-agent copies of game state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actions::{Action, ActionPayload};
use crate::enums::{ActionKind, Phase, Role};
use crate::ids::{GameId, ParticipantId};
use crate::result::Outcome;

/// Who may see a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Every participant.
    Public,
    /// Traitors only (living or dead).
    Traitors,
    /// A single participant.
    Participant(ParticipantId),
    /// The two parties of a private conversation.
    Pair(ParticipantId, ParticipantId),
}

impl Visibility {
    /// Whether `viewer`, holding `role`, may see a record with this scope.
    pub fn can_see(&self, viewer: &ParticipantId, role: Role) -> bool {
        match self {
            Self::Public => true,
            Self::Traitors => role == Role::Traitor,
            Self::Participant(id) => id == viewer,
            Self::Pair(first, second) => first == viewer || second == viewer,
        }
    }
}

/// The result of a single model invocation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The response parsed and validated.
    Accepted,
    /// The response was received but failed parsing or validation.
    Rejected {
        /// Why the response was rejected.
        reason: String,
    },
    /// The model did not answer before the decision timeout.
    TimedOut {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },
    /// The model capability returned an error.
    BackendError {
        /// Error reported by the capability.
        message: String,
    },
}

impl AttemptOutcome {
    /// Whether this attempt produced a usable decision.
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// One prompt sent to an agent's model and the response received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Transcript sequence number, assigned on append.
    pub seq: u64,
    /// The prompted participant.
    pub participant: ParticipantId,
    /// Round index.
    pub round: u32,
    /// Phase during which the prompt was issued.
    pub phase: Phase,
    /// The decision being requested.
    pub kind: ActionKind,
    /// 1-based attempt number within this decision.
    pub attempt: u32,
    /// System prompt sent with the request.
    pub system_prompt: String,
    /// User prompt text.
    pub prompt: String,
    /// Response text, if the model answered at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
    /// Wall-clock time the attempt finished.
    pub recorded_at: DateTime<Utc>,
}

/// What an engine announcement says.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// The game started with these participants (join order).
    GameStarted {
        /// The game.
        game_id: GameId,
        /// All participants.
        participants: Vec<ParticipantId>,
        /// Seed used for role assignment.
        role_seed: u64,
    },
    /// A participant learns their own role.
    RoleAssigned {
        /// The participant.
        participant: ParticipantId,
        /// Their role.
        role: Role,
    },
    /// The Traitors learn who the Traitors are.
    TraitorsRevealed {
        /// Every Traitor, in join order.
        traitors: Vec<ParticipantId>,
    },
    /// The phase machine entered a phase.
    PhaseEntered {
        /// The phase entered.
        phase: Phase,
    },
    /// The Traitors settled on tonight's victim (or nobody).
    MurderDecided {
        /// The chosen victim, if any Traitor cast a valid vote.
        target: Option<ParticipantId>,
        /// Votes the victim received.
        votes: u32,
    },
    /// Morning announcement of the night's murder.
    MurderRevealed {
        /// The victim, if anyone was murdered.
        victim: Option<ParticipantId>,
    },
    /// Round Table votes are revealed, in voter join order.
    VotesRevealed {
        /// `(voter, target)` pairs; `None` for an abstention.
        votes: Vec<(ParticipantId, Option<ParticipantId>)>,
    },
    /// A tie forced a revote among the tied candidates.
    RevoteCalled {
        /// Candidates in the revote.
        candidates: Vec<ParticipantId>,
    },
    /// A participant was banished.
    Banished {
        /// The banished participant.
        participant: ParticipantId,
        /// Votes they received.
        votes: u32,
        /// Their role, when roles are revealed on banishment.
        role: Option<Role>,
    },
    /// Nobody was banished this round.
    NoBanishment {
        /// Candidates tied for the most votes (empty if nobody voted).
        tied: Vec<ParticipantId>,
        /// Vote count they were tied on.
        votes: u32,
    },
    /// A round finished without a terminal condition.
    RoundCompleted,
    /// The game ended.
    GameEnded {
        /// How it ended.
        outcome: Outcome,
    },
}

/// An engine announcement with its visibility scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Transcript sequence number, assigned on append.
    pub seq: u64,
    /// Round index.
    pub round: u32,
    /// Phase during which the event occurred.
    pub phase: Phase,
    /// Who may see the event.
    pub visibility: Visibility,
    /// What happened.
    pub kind: EventKind,
}

/// One entry in a game's ordered audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum Record {
    /// A model prompt/response exchange.
    Exchange(TranscriptEntry),
    /// A validated agent action.
    Action(Action),
    /// An engine announcement.
    Event(GameEvent),
}

impl Record {
    /// Sequence number of the record.
    pub const fn seq(&self) -> u64 {
        match self {
            Self::Exchange(entry) => entry.seq,
            Self::Action(action) => action.seq,
            Self::Event(event) => event.seq,
        }
    }

    /// Round the record belongs to.
    pub const fn round(&self) -> u32 {
        match self {
            Self::Exchange(entry) => entry.round,
            Self::Action(action) => action.round,
            Self::Event(event) => event.round,
        }
    }

    /// Visibility scope of the record.
    ///
    /// Exchanges are private to the prompted participant. Night actions are
    /// Traitor-only; private conversation messages are seen by both parties;
    /// other day actions are public (banishment votes are only ever appended
    /// after every vote is in).
    pub fn visibility(&self) -> Visibility {
        match self {
            Self::Exchange(entry) => Visibility::Participant(entry.participant.clone()),
            Self::Action(action) => match action.kind {
                ActionKind::TraitorMessage | ActionKind::MurderVote => Visibility::Traitors,
                ActionKind::PrivateMessage => match &action.recipient {
                    Some(recipient) => Visibility::Pair(action.actor.clone(), recipient.clone()),
                    None => Visibility::Participant(action.actor.clone()),
                },
                ActionKind::DiscussionStatement | ActionKind::BanishmentVote => Visibility::Public,
            },
            Self::Event(event) => event.visibility.clone(),
        }
    }

    /// Whether `viewer`, holding `role`, may see this record.
    pub fn visible_to(&self, viewer: &ParticipantId, role: Role) -> bool {
        self.visibility().can_see(viewer, role)
    }

    /// A one-line natural-language rendering for agent prompts.
    ///
    /// Exchanges have no narrative form and return `None`.
    pub fn describe(&self) -> Option<String> {
        match self {
            Self::Exchange(_) => None,
            Self::Action(action) => Some(describe_action(action)),
            Self::Event(event) => describe_event(&event.kind),
        }
    }
}

fn describe_action(action: &Action) -> String {
    let actor = &action.actor;
    match (&action.kind, &action.payload) {
        (ActionKind::TraitorMessage, ActionPayload::Statement { text }) => {
            format!("[traitors only] {actor} said: {text:?}")
        }
        (ActionKind::PrivateMessage, ActionPayload::Statement { text }) => match &action.recipient {
            Some(recipient) => format!("[private] {actor} messaged {recipient}: {text:?}"),
            None => format!("[private] {actor} said: {text:?}"),
        },
        (ActionKind::DiscussionStatement, ActionPayload::Statement { text }) => {
            format!("{actor} said: {text:?}")
        }
        (ActionKind::MurderVote, ActionPayload::Target { target, .. }) => {
            format!("[traitors only] {actor} voted to murder {target}")
        }
        (ActionKind::BanishmentVote, ActionPayload::Target { target, .. }) => {
            format!("{actor} voted to banish {target}")
        }
        (kind, ActionPayload::Abstain { .. }) => {
            format!("{actor} abstained ({kind})")
        }
        (kind, _) => format!("{actor} acted ({kind})"),
    }
}

fn describe_event(kind: &EventKind) -> Option<String> {
    let text = match kind {
        EventKind::GameStarted { participants, .. } => {
            format!("The game started with players: {}", join_ids(participants))
        }
        EventKind::RoleAssigned { participant, role } => {
            format!("{participant}, you were selected as a {role}.")
        }
        EventKind::TraitorsRevealed { traitors } => {
            format!("[traitors only] The traitors are: {}", join_ids(traitors))
        }
        EventKind::PhaseEntered { phase } => match phase {
            Phase::Night => "Night falls.".to_owned(),
            Phase::DayDiscussion => "Day breaks and the group gathers to talk.".to_owned(),
            Phase::RoundTableVote => "The Round Table vote begins.".to_owned(),
            Phase::Banishment | Phase::WinCheck | Phase::Terminal => return None,
        },
        EventKind::MurderDecided { target, votes } => match target {
            Some(target) => {
                format!("[traitors only] The traitors chose to murder {target} ({votes} votes).")
            }
            None => "[traitors only] The traitors could not agree on a victim.".to_owned(),
        },
        EventKind::MurderRevealed { victim } => match victim {
            Some(victim) => format!("{victim} was MURDERED by the traitors."),
            None => "Nobody was murdered last night.".to_owned(),
        },
        EventKind::VotesRevealed { votes } => {
            let lines: Vec<String> = votes
                .iter()
                .map(|(voter, target)| match target {
                    Some(target) => format!("{voter} -> {target}"),
                    None => format!("{voter} -> (abstained)"),
                })
                .collect();
            format!("Round Table votes: {}", lines.join(", "))
        }
        EventKind::RevoteCalled { candidates } => {
            format!("The vote was tied. Revote between: {}", join_ids(candidates))
        }
        EventKind::Banished {
            participant,
            votes,
            role,
        } => match role {
            Some(role) => {
                format!("{participant} was BANISHED with {votes} votes. They were a {role}.")
            }
            None => format!("{participant} was BANISHED with {votes} votes."),
        },
        EventKind::NoBanishment { tied, votes } => {
            if tied.is_empty() {
                "Nobody was banished: no valid votes were cast.".to_owned()
            } else {
                format!(
                    "Nobody was banished: {} tied with {votes} votes each.",
                    join_ids(tied)
                )
            }
        }
        EventKind::RoundCompleted => return None,
        EventKind::GameEnded { outcome } => format!("The game is over: {outcome}."),
    };
    Some(text)
}

fn join_ids(ids: &[ParticipantId]) -> String {
    ids.iter()
        .map(ParticipantId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, visibility: Visibility) -> Record {
        Record::Event(GameEvent {
            seq: 1,
            round: 0,
            phase: Phase::Night,
            visibility,
            kind,
        })
    }

    #[test]
    fn traitor_scope_hides_from_faithfuls() {
        let record = event(
            EventKind::TraitorsRevealed {
                traitors: vec![ParticipantId::new("T")],
            },
            Visibility::Traitors,
        );
        assert!(record.visible_to(&ParticipantId::new("T"), Role::Traitor));
        assert!(!record.visible_to(&ParticipantId::new("F"), Role::Faithful));
    }

    #[test]
    fn participant_scope_is_private() {
        let record = event(
            EventKind::RoleAssigned {
                participant: ParticipantId::new("A"),
                role: Role::Faithful,
            },
            Visibility::Participant(ParticipantId::new("A")),
        );
        assert!(record.visible_to(&ParticipantId::new("A"), Role::Faithful));
        assert!(!record.visible_to(&ParticipantId::new("B"), Role::Traitor));
    }

    #[test]
    fn murder_votes_are_traitor_only() {
        let record = Record::Action(Action {
            seq: 4,
            round: 0,
            phase: Phase::Night,
            actor: ParticipantId::new("T"),
            kind: ActionKind::MurderVote,
            recipient: None,
            payload: ActionPayload::Target {
                target: ParticipantId::new("F"),
                reasoning: None,
            },
            raw_response: None,
        });
        assert_eq!(record.visibility(), Visibility::Traitors);
        assert_eq!(
            record.describe().as_deref(),
            Some("[traitors only] T voted to murder F")
        );
    }

    #[test]
    fn private_messages_are_seen_by_both_parties_only() {
        let record = Record::Action(Action {
            seq: 7,
            round: 1,
            phase: Phase::DayDiscussion,
            actor: ParticipantId::new("A"),
            kind: ActionKind::PrivateMessage,
            recipient: Some(ParticipantId::new("B")),
            payload: ActionPayload::Statement {
                text: "I think it's C".to_owned(),
            },
            raw_response: None,
        });
        assert_eq!(
            record.visibility(),
            Visibility::Pair(ParticipantId::new("A"), ParticipantId::new("B"))
        );
        assert!(record.visible_to(&ParticipantId::new("A"), Role::Faithful));
        assert!(record.visible_to(&ParticipantId::new("B"), Role::Faithful));
        assert!(!record.visible_to(&ParticipantId::new("C"), Role::Faithful));
        assert!(!record.visible_to(&ParticipantId::new("T"), Role::Traitor));
        assert_eq!(
            record.describe().as_deref(),
            Some("[private] A messaged B: \"I think it's C\"")
        );
    }

    #[test]
    fn exchanges_have_no_narrative() {
        let record = Record::Exchange(TranscriptEntry {
            seq: 2,
            participant: ParticipantId::new("A"),
            round: 0,
            phase: Phase::DayDiscussion,
            kind: ActionKind::DiscussionStatement,
            attempt: 1,
            system_prompt: String::new(),
            prompt: "say something".to_owned(),
            response: Some("{}".to_owned()),
            outcome: AttemptOutcome::Rejected {
                reason: "missing statement".to_owned(),
            },
            recorded_at: Utc::now(),
        });
        assert!(record.describe().is_none());
        assert!(!record.visible_to(&ParticipantId::new("B"), Role::Traitor));
    }
}
