//! Private daytime conversations.
//!
//! Before the public discussion, randomly chosen pairs of living players
//! trade a few messages that only the two of them can read. Pairings and
//! lengths are drawn from an RNG seeded by the role seed and the round, so
//! a seeded game (or a resumed one) arranges the same conversations.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use traitors_types::ParticipantId;

/// Keeps the pairing stream apart from the tie-break stream.
const PAIRING_SALT: u64 = 0x7072_6976_6174_6531;

/// One private conversation. `first` speaks on odd-numbered messages,
/// `second` on even ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateConversation {
    /// Opens the conversation.
    pub first: ParticipantId,
    /// Replies first.
    pub second: ParticipantId,
    /// Messages exchanged in total, at least 1.
    pub messages: u32,
}

impl PrivateConversation {
    /// `(sender, recipient)` for every message, in order.
    pub fn turns(&self) -> impl Iterator<Item = (&ParticipantId, &ParticipantId)> + '_ {
        [(&self.first, &self.second), (&self.second, &self.first)]
            .into_iter()
            .cycle()
            .take(usize::try_from(self.messages).unwrap_or(usize::MAX))
    }
}

/// Arrange up to `conversations` pairings among `living` for `round`.
///
/// At most one conversation per living player is held, and none when
/// fewer than two are alive. The same player may appear in several
/// conversations.
pub fn arrange(
    living: &[ParticipantId],
    conversations: u32,
    max_messages: u32,
    role_seed: u64,
    round: u32,
) -> Vec<PrivateConversation> {
    if living.len() < 2 || conversations == 0 || max_messages == 0 {
        return Vec::new();
    }
    let count = usize::try_from(conversations)
        .unwrap_or(usize::MAX)
        .min(living.len());
    let mut rng = StdRng::seed_from_u64((role_seed ^ PAIRING_SALT).wrapping_add(u64::from(round)));

    let mut arranged = Vec::with_capacity(count);
    for _ in 0..count {
        let mut picked = rand::seq::index::sample(&mut rng, living.len(), 2).into_iter();
        let (Some(first), Some(second)) = (
            picked.next().and_then(|i| living.get(i)),
            picked.next().and_then(|i| living.get(i)),
        ) else {
            continue;
        };
        arranged.push(PrivateConversation {
            first: first.clone(),
            second: second.clone(),
            messages: rng.random_range(1..=max_messages),
        });
    }
    arranged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<ParticipantId> {
        names.iter().map(|n| ParticipantId::new(*n)).collect()
    }

    #[test]
    fn pairs_are_two_distinct_living_players() {
        let living = ids(&["A", "B", "C", "D", "E"]);
        for seed in 0..50 {
            for conversation in arrange(&living, 4, 5, seed, 2) {
                assert_ne!(conversation.first, conversation.second);
                assert!(living.contains(&conversation.first));
                assert!(living.contains(&conversation.second));
                assert!((1..=5).contains(&conversation.messages));
            }
        }
    }

    #[test]
    fn same_seed_and_round_same_arrangement() {
        let living = ids(&["A", "B", "C", "D"]);
        assert_eq!(arrange(&living, 3, 5, 11, 1), arrange(&living, 3, 5, 11, 1));
    }

    #[test]
    fn count_is_capped_by_living_players() {
        assert_eq!(arrange(&ids(&["A", "B", "C"]), 10, 2, 1, 0).len(), 3);
        assert!(arrange(&ids(&["A"]), 4, 5, 1, 0).is_empty());
        assert!(arrange(&ids(&["A", "B"]), 0, 5, 1, 0).is_empty());
    }

    #[test]
    fn turns_alternate_between_the_pair() {
        let conversation = PrivateConversation {
            first: ParticipantId::new("A"),
            second: ParticipantId::new("B"),
            messages: 3,
        };
        let senders: Vec<&str> = conversation.turns().map(|(s, _)| s.as_str()).collect();
        assert_eq!(senders, vec!["A", "B", "A"]);
    }
}
