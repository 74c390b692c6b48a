//! Identifier types.
//!
//! Games are identified by UUID v7 (time-ordered) so result directories and
//! transcripts from many benchmark runs sort by creation time. Participants
//! are identified by their configured name, which is also the token agents
//! use when they name a vote target.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a single game instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GameId(pub Uuid);

impl GameId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for GameId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for GameId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for GameId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Unique identifier for a participant: their name.
///
/// Names are unique within a game (enforced by config validation) and are
/// what agents write when they choose a target, so the identifier and the
/// decision vocabulary are the same string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Create an identifier from a participant name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for ParticipantId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for ParticipantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
