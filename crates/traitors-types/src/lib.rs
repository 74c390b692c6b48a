//! Shared type definitions for the Traitors agent game engine.
//!
//! Everything that crosses a crate boundary lives here: identifiers, roles
//! and phases, the action records agents produce, the append-only transcript
//! records, and the terminal [`GameResult`]. All types serialize with `serde`
//! so a finished game can be written out and analyzed by external tooling.
//!
//! # Modules
//!
//! - [`ids`] -- Game and participant identifiers
//! - [`enums`] -- Roles, factions, phases, elimination causes, run states
//! - [`actions`] -- Validated agent actions (votes, statements, abstentions)
//! - [`records`] -- Transcript entries, game events, visibility scopes
//! - [`result`] -- Terminal game result and status snapshots

pub mod actions;
pub mod enums;
pub mod ids;
pub mod records;
pub mod result;

// Re-export all public types at crate root for convenience.
pub use actions::{Action, ActionPayload};
pub use enums::{ActionKind, EliminationCause, Faction, Phase, Role, RunState};
pub use ids::{GameId, ParticipantId};
pub use records::{AttemptOutcome, EventKind, GameEvent, Record, TranscriptEntry, Visibility};
pub use result::{Elimination, FinalStanding, GameResult, GameStatus, Outcome, WinReason};
