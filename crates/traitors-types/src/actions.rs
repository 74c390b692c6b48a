//! Validated agent actions.
//!
//! An [`Action`] is what remains of an agent's decision once the decision
//! protocol has parsed and validated the model's response. Raw text never
//! reaches the engine's roster logic: only a validated [`ActionPayload`]
//! does, with the raw response kept alongside for audit.

use serde::{Deserialize, Serialize};

use crate::enums::{ActionKind, Phase};
use crate::ids::ParticipantId;

/// The validated content of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPayload {
    /// A vote naming a living participant.
    Target {
        /// The participant voted for.
        target: ParticipantId,
        /// Optional reasoning supplied by the agent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
    },
    /// Free text (traitor channel, private conversation or public
    /// statement).
    Statement {
        /// The statement, already bounded in length.
        text: String,
    },
    /// The forced safe default after the agent never produced a valid
    /// decision. Abstentions never count toward a tally.
    Abstain {
        /// Why the agent abstained (last validation failure).
        reason: String,
    },
}

impl ActionPayload {
    /// The vote target, if this payload is a vote.
    pub const fn target(&self) -> Option<&ParticipantId> {
        match self {
            Self::Target { target, .. } => Some(target),
            Self::Statement { .. } | Self::Abstain { .. } => None,
        }
    }

    /// Whether this payload is a forced abstention.
    pub const fn is_abstain(&self) -> bool {
        matches!(self, Self::Abstain { .. })
    }
}

/// An immutable record of one agent action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Transcript sequence number, assigned on append.
    pub seq: u64,
    /// Round index in which the action was taken.
    pub round: u32,
    /// Phase in which the action was taken.
    pub phase: Phase,
    /// The acting participant (alive when the action was taken).
    pub actor: ParticipantId,
    /// What kind of decision this was.
    pub kind: ActionKind,
    /// The other party of a private conversation message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ParticipantId>,
    /// Validated payload.
    pub payload: ActionPayload,
    /// Raw model response the payload was parsed from, if any attempt
    /// produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abstain_has_no_target() {
        let payload = ActionPayload::Abstain {
            reason: "no valid response".to_owned(),
        };
        assert!(payload.is_abstain());
        assert!(payload.target().is_none());
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = ActionPayload::Target {
            target: ParticipantId::new("Bob"),
            reasoning: None,
        };
        let json = serde_json::to_value(&payload).unwrap_or_default();
        assert_eq!(json.get("type").and_then(|t| t.as_str()), Some("target"));
        assert_eq!(json.get("target").and_then(|t| t.as_str()), Some("Bob"));
        assert!(json.get("reasoning").is_none());
    }
}
