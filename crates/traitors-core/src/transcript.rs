//! The append-only transcript store.
//!
//! One store per game holds every exchange, action and event in the order
//! they were produced. The store assigns sequence numbers on append, so a
//! caller can never produce a gap or a reordering. Prompt context is derived
//! from the store by visibility filtering.

use chrono::Utc;
use traitors_types::{
    Action, ActionKind, ActionPayload, AttemptOutcome, EventKind, GameEvent, ParticipantId, Phase,
    Record, Role, TranscriptEntry, Visibility,
};

use crate::config::ContextWindow;

/// A model exchange before it has been sequenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// The prompted participant.
    pub participant: ParticipantId,
    /// Round index.
    pub round: u32,
    /// Phase of the request.
    pub phase: Phase,
    /// Decision kind.
    pub kind: ActionKind,
    /// 1-based attempt number.
    pub attempt: u32,
    /// System prompt.
    pub system_prompt: String,
    /// User prompt.
    pub prompt: String,
    /// Response text, if any.
    pub response: Option<String>,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
}

/// Ordered, append-only record of one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    records: Vec<Record>,
    next_seq: u64,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    /// An empty transcript. The first record gets sequence number 1.
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
            next_seq: 1,
        }
    }

    /// Rebuild a transcript from recorded records, keeping their sequence
    /// numbers. Returns `None` unless sequence numbers strictly increase.
    pub fn from_records(records: Vec<Record>) -> Option<Self> {
        let mut last = 0_u64;
        for record in &records {
            if record.seq() <= last {
                return None;
            }
            last = record.seq();
        }
        Some(Self {
            records,
            next_seq: last.checked_add(1)?,
        })
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        seq
    }

    /// Append a model exchange; returns its sequence number.
    pub fn push_exchange(&mut self, exchange: Exchange) -> u64 {
        let seq = self.take_seq();
        self.records.push(Record::Exchange(TranscriptEntry {
            seq,
            participant: exchange.participant,
            round: exchange.round,
            phase: exchange.phase,
            kind: exchange.kind,
            attempt: exchange.attempt,
            system_prompt: exchange.system_prompt,
            prompt: exchange.prompt,
            response: exchange.response,
            outcome: exchange.outcome,
            recorded_at: Utc::now(),
        }));
        seq
    }

    /// Append a validated action; returns its sequence number.
    pub fn push_action(
        &mut self,
        round: u32,
        phase: Phase,
        actor: ParticipantId,
        kind: ActionKind,
        payload: ActionPayload,
        raw_response: Option<String>,
    ) -> u64 {
        self.append_action(round, phase, actor, kind, None, payload, raw_response)
    }

    /// Append a private conversation message from `actor` to `recipient`;
    /// only the two of them will see it.
    pub fn push_private_message(
        &mut self,
        round: u32,
        actor: ParticipantId,
        recipient: ParticipantId,
        payload: ActionPayload,
        raw_response: Option<String>,
    ) -> u64 {
        self.append_action(
            round,
            Phase::DayDiscussion,
            actor,
            ActionKind::PrivateMessage,
            Some(recipient),
            payload,
            raw_response,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn append_action(
        &mut self,
        round: u32,
        phase: Phase,
        actor: ParticipantId,
        kind: ActionKind,
        recipient: Option<ParticipantId>,
        payload: ActionPayload,
        raw_response: Option<String>,
    ) -> u64 {
        let seq = self.take_seq();
        self.records.push(Record::Action(Action {
            seq,
            round,
            phase,
            actor,
            kind,
            recipient,
            payload,
            raw_response,
        }));
        seq
    }

    /// Append an engine event; returns its sequence number.
    pub fn push_event(
        &mut self,
        round: u32,
        phase: Phase,
        visibility: Visibility,
        kind: EventKind,
    ) -> u64 {
        let seq = self.take_seq();
        self.records.push(Record::Event(GameEvent {
            seq,
            round,
            phase,
            visibility,
            kind,
        }));
        seq
    }

    /// Every record in order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records with a sequence number greater than `seq`.
    pub fn since(&self, seq: u64) -> &[Record] {
        let start = self.records.partition_point(|r| r.seq() <= seq);
        self.records.get(start..).unwrap_or_default()
    }

    /// Model exchanges recorded for one participant, in order.
    pub fn exchanges_for<'a>(
        &'a self,
        participant: &'a ParticipantId,
    ) -> impl Iterator<Item = &'a TranscriptEntry> + 'a {
        self.records.iter().filter_map(move |r| match r {
            Record::Exchange(entry) if &entry.participant == participant => Some(entry),
            Record::Exchange(_) | Record::Action(_) | Record::Event(_) => None,
        })
    }

    /// Sequence number of the participant's most recent action, or 0.
    pub fn last_turn(&self, participant: &ParticipantId) -> u64 {
        self.records
            .iter()
            .rev()
            .find_map(|r| match r {
                Record::Action(action) if &action.actor == participant => Some(action.seq),
                Record::Action(_) | Record::Exchange(_) | Record::Event(_) => None,
            })
            .unwrap_or(0)
    }

    /// Narrative lines `viewer` may see, limited by `window`.
    ///
    /// `round` is the round being played; [`ContextWindow::SinceLastTurn`]
    /// never starts later than its first record.
    pub fn context_for(
        &self,
        viewer: &ParticipantId,
        role: Role,
        window: ContextWindow,
        round: u32,
    ) -> Vec<String> {
        let records = match window {
            ContextWindow::Full => self.records(),
            ContextWindow::SinceLastTurn => {
                let last_turn = self.last_turn(viewer);
                let after_turn = self.records.partition_point(|r| r.seq() <= last_turn);
                let round_start = self.records.partition_point(|r| r.round() < round);
                self.records
                    .get(after_turn.min(round_start)..)
                    .unwrap_or_default()
            }
        };
        records
            .iter()
            .filter(|r| r.visible_to(viewer, role))
            .filter_map(Record::describe)
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn statement(transcript: &mut Transcript, actor: &str, text: &str) -> u64 {
        statement_in(transcript, 0, actor, text)
    }

    fn statement_in(transcript: &mut Transcript, round: u32, actor: &str, text: &str) -> u64 {
        transcript.push_action(
            round,
            Phase::DayDiscussion,
            ParticipantId::new(actor),
            ActionKind::DiscussionStatement,
            ActionPayload::Statement {
                text: text.to_owned(),
            },
            None,
        )
    }

    #[test]
    fn sequence_numbers_strictly_increase_across_kinds() {
        let mut transcript = Transcript::new();
        let a = transcript.push_event(
            0,
            Phase::Night,
            Visibility::Public,
            EventKind::PhaseEntered { phase: Phase::Night },
        );
        let b = statement(&mut transcript, "A", "hello");
        let c = transcript.push_exchange(Exchange {
            participant: ParticipantId::new("B"),
            round: 0,
            phase: Phase::DayDiscussion,
            kind: ActionKind::DiscussionStatement,
            attempt: 1,
            system_prompt: String::new(),
            prompt: "p".to_owned(),
            response: None,
            outcome: AttemptOutcome::TimedOut { timeout_ms: 10 },
        });
        assert!(a < b && b < c);
        assert_eq!(transcript.len(), 3);
    }

    #[test]
    fn context_since_last_turn_keeps_the_current_round() {
        let mut transcript = Transcript::new();
        statement_in(&mut transcript, 0, "A", "first");
        statement_in(&mut transcript, 0, "B", "second");
        statement_in(&mut transcript, 1, "A", "third");
        statement_in(&mut transcript, 1, "C", "fourth");

        let a = ParticipantId::new("A");
        // A spoke in round 1, but round 1 is still being played
        let lines = transcript.context_for(&a, Role::Faithful, ContextWindow::SinceLastTurn, 1);
        assert_eq!(
            lines,
            vec!["A said: \"third\"".to_owned(), "C said: \"fourth\"".to_owned()]
        );

        let next_round = transcript.context_for(&a, Role::Faithful, ContextWindow::SinceLastTurn, 2);
        assert_eq!(next_round, vec!["C said: \"fourth\"".to_owned()]);

        let full = transcript.context_for(&a, Role::Faithful, ContextWindow::Full, 2);
        assert_eq!(full.len(), 4);
    }

    #[test]
    fn private_messages_reach_only_the_pair() {
        let mut transcript = Transcript::new();
        transcript.push_private_message(
            0,
            ParticipantId::new("A"),
            ParticipantId::new("B"),
            ActionPayload::Statement {
                text: "trust me".to_owned(),
            },
            None,
        );
        let seen_by = |name: &str, role: Role| {
            transcript
                .context_for(&ParticipantId::new(name), role, ContextWindow::Full, 0)
                .len()
        };
        assert_eq!(seen_by("A", Role::Faithful), 1);
        assert_eq!(seen_by("B", Role::Traitor), 1);
        assert_eq!(seen_by("C", Role::Traitor), 0);
    }

    #[test]
    fn context_hides_traitor_records_from_faithfuls() {
        let mut transcript = Transcript::new();
        transcript.push_action(
            0,
            Phase::Night,
            ParticipantId::new("T"),
            ActionKind::TraitorMessage,
            ActionPayload::Statement {
                text: "kill F".to_owned(),
            },
            None,
        );
        let f = ParticipantId::new("F");
        assert!(transcript
            .context_for(&f, Role::Faithful, ContextWindow::Full, 0)
            .is_empty());
        let t2 = ParticipantId::new("T2");
        assert_eq!(
            transcript
                .context_for(&t2, Role::Traitor, ContextWindow::Full, 0)
                .len(),
            1
        );
    }

    #[test]
    fn from_records_rejects_out_of_order() {
        let mut transcript = Transcript::new();
        statement(&mut transcript, "A", "x");
        statement(&mut transcript, "B", "y");
        let mut records = transcript.records().to_vec();
        records.reverse();
        assert!(Transcript::from_records(records).is_none());

        let mut rebuilt = Transcript::from_records(transcript.records().to_vec()).unwrap();
        assert_eq!(statement(&mut rebuilt, "C", "z"), 3);
    }
}
