//! Rebuilding an unfinished game from its recorded transcript.
//!
//! A transcript is replayed up to the last `RoundCompleted` event. Roles
//! come from the recorded `RoleAssigned` events and eliminations from the
//! recorded morning and Round Table announcements, so the roster is exactly
//! what the original run had at the end of that round. Anything recorded
//! after it belongs to an unfinished round and is dropped.

use chrono::{DateTime, Utc};
use traitors_types::{
    Elimination, EliminationCause, EventKind, GameEvent, GameId, ParticipantId, Record, Role,
};

use crate::config::GameConfig;
use crate::error::GameError;
use crate::phase::RestoredGame;
use crate::registry::Registry;
use crate::resolver;
use crate::transcript::Transcript;

/// Rebuild the state of a recorded game at the end of its last completed
/// round.
///
/// # Errors
///
/// Returns [`GameError::Replay`] if the records do not start with the game
/// setup, the participants differ from `config`, the game already ended,
/// sequence numbers are out of order, or the recorded roster is not in a
/// playable state.
pub fn restore(config: &GameConfig, mut records: Vec<Record>) -> Result<RestoredGame, GameError> {
    let (game_id, role_seed) = check_setup(config, &records)?;
    let roles = recorded_roles(config, &records)?;

    if events(&records).any(|e| matches!(e.kind, EventKind::GameEnded { .. })) {
        return Err(replay("the recorded game already ended"));
    }

    let (keep, round) = match records
        .iter()
        .rposition(|r| matches!(r, Record::Event(e) if e.kind == EventKind::RoundCompleted))
    {
        Some(index) => {
            let completed = records.get(index).map_or(0, Record::round);
            (index.saturating_add(1), completed.saturating_add(1))
        }
        None => {
            let setup_end = records
                .iter()
                .position(|r| matches!(r, Record::Event(e) if matches!(e.kind, EventKind::TraitorsRevealed { .. })))
                .ok_or_else(|| replay("the setup events are incomplete"))?;
            (setup_end.saturating_add(1), 0)
        }
    };
    records.truncate(keep);

    if round >= config.max_rounds {
        return Err(replay(format!(
            "round {round} is past the limit of {} rounds",
            config.max_rounds
        )));
    }

    let mut registry = Registry::with_roles(config, &roles);
    let mut eliminations = Vec::new();
    for event in events(&records) {
        let (participant, cause) = match &event.kind {
            EventKind::MurderRevealed {
                victim: Some(victim),
            } => (victim, EliminationCause::Murdered),
            EventKind::Banished { participant, .. } => (participant, EliminationCause::Banished),
            _ => continue,
        };
        let eliminated = registry
            .mark_eliminated(participant, cause, event.round)
            .map_err(|e| replay(format!("recorded elimination in round {}: {e}", event.round)))?;
        eliminations.push(Elimination {
            round: event.round,
            cause,
            participant: eliminated.id.clone(),
            role: eliminated.role,
        });
    }

    resolver::assert_conservation(&registry, round)?;
    let counts = registry.counts();
    if counts.traitors == 0 || counts.traitors >= counts.faithfuls {
        return Err(replay("the recorded roster has already reached a terminal condition"));
    }

    let started_at: Option<DateTime<Utc>> = records.iter().find_map(|r| match r {
        Record::Exchange(entry) => Some(entry.recorded_at),
        _ => None,
    });
    let transcript = Transcript::from_records(records)
        .ok_or_else(|| replay("sequence numbers are not strictly increasing"))?;

    Ok(RestoredGame {
        game_id,
        registry,
        transcript,
        round,
        role_seed,
        eliminations,
        started_at,
    })
}

fn check_setup(config: &GameConfig, records: &[Record]) -> Result<(GameId, u64), GameError> {
    let Some(Record::Event(GameEvent {
        kind:
            EventKind::GameStarted {
                game_id,
                participants,
                role_seed,
            },
        ..
    })) = records.first()
    else {
        return Err(replay("the transcript does not begin with a game start"));
    };

    let configured: Vec<&str> = config.participants.iter().map(|p| p.name.as_str()).collect();
    let recorded: Vec<&str> = participants.iter().map(ParticipantId::as_str).collect();
    if configured != recorded {
        return Err(replay(format!(
            "recorded participants {recorded:?} do not match configured {configured:?}"
        )));
    }
    Ok((*game_id, *role_seed))
}

fn recorded_roles(config: &GameConfig, records: &[Record]) -> Result<Vec<Role>, GameError> {
    config
        .participants
        .iter()
        .map(|p| {
            events(records)
                .find_map(|e| match &e.kind {
                    EventKind::RoleAssigned { participant, role } if participant.as_str() == p.name => {
                        Some(*role)
                    }
                    _ => None,
                })
                .ok_or_else(|| replay(format!("no recorded role for {}", p.name)))
        })
        .collect()
}

fn events(records: &[Record]) -> impl Iterator<Item = &GameEvent> {
    records.iter().filter_map(|r| match r {
        Record::Event(event) => Some(event),
        _ => None,
    })
}

fn replay(reason: impl Into<String>) -> GameError {
    GameError::Replay {
        reason: reason.into(),
    }
}
