//! The participant registry: the authoritative roster of one game.
//!
//! Participants are created once, at game start, and never removed. An
//! elimination only flips the alive flag and records the cause, so the
//! registry always answers questions about the full table as well as the
//! living one. Only the resolver mutates it.

use rand::Rng;
use rust_decimal::Decimal;
use traitors_types::{EliminationCause, ParticipantId, Role};

use crate::config::GameConfig;
use crate::error::{ConfigError, InvalidTargetError, TargetProblem};

/// One participant's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Unique name.
    pub id: ParticipantId,
    /// Secret role, fixed at assignment.
    pub role: Role,
    /// Model reference backing this participant.
    pub model: String,
    /// Whether the participant is still in the game.
    pub alive: bool,
    /// Cause and round of elimination, if eliminated.
    pub eliminated: Option<(EliminationCause, u32)>,
    /// Cumulative earnings.
    pub earnings: Decimal,
    /// Position in the configured participant list.
    pub join_index: usize,
}

/// Living participants by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterCounts {
    /// Living Traitors.
    pub traitors: usize,
    /// Living Faithfuls.
    pub faithfuls: usize,
}

/// The roster, in join order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    participants: Vec<Participant>,
}

impl Registry {
    /// Create the roster from configuration, drawing exactly
    /// `traitor_count` Traitors uniformly at random.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TraitorCount`] if the traitor count is zero or
    /// not smaller than the number of participants.
    pub fn initialize<R: Rng + ?Sized>(config: &GameConfig, rng: &mut R) -> Result<Self, ConfigError> {
        let total = config.participants.len();
        let traitors = usize::try_from(config.traitor_count).unwrap_or(usize::MAX);
        if traitors < 1 || traitors >= total {
            return Err(ConfigError::TraitorCount {
                traitors: config.traitor_count,
                participants: total,
            });
        }

        let mut roles = vec![Role::Faithful; total];
        for index in rand::seq::index::sample(rng, total, traitors) {
            if let Some(role) = roles.get_mut(index) {
                *role = Role::Traitor;
            }
        }

        Ok(Self::with_roles(config, &roles))
    }

    /// Create the roster with roles already decided (used when replaying a
    /// recorded game). `roles` is indexed by join order.
    pub fn with_roles(config: &GameConfig, roles: &[Role]) -> Self {
        let participants = config
            .participants
            .iter()
            .zip(roles)
            .enumerate()
            .map(|(join_index, (p, &role))| Participant {
                id: ParticipantId::new(p.name.as_str()),
                role,
                model: p.model.clone(),
                alive: true,
                eliminated: None,
                earnings: Decimal::ZERO,
                join_index,
            })
            .collect();
        Self { participants }
    }

    /// Every participant, living or dead, in join order.
    pub fn all(&self) -> &[Participant] {
        &self.participants
    }

    /// Living participants in join order.
    pub fn living(&self) -> Vec<&Participant> {
        self.participants.iter().filter(|p| p.alive).collect()
    }

    /// Living participants holding `role`, in join order.
    pub fn living_with_role(&self, role: Role) -> Vec<&Participant> {
        self.participants
            .iter()
            .filter(|p| p.alive && p.role == role)
            .collect()
    }

    /// Ids of living participants, in join order.
    pub fn living_ids(&self) -> Vec<ParticipantId> {
        self.participants
            .iter()
            .filter(|p| p.alive)
            .map(|p| p.id.clone())
            .collect()
    }

    /// Every participant holding `role` (living or dead), in join order.
    pub fn with_role(&self, role: Role) -> Vec<ParticipantId> {
        self.participants
            .iter()
            .filter(|p| p.role == role)
            .map(|p| p.id.clone())
            .collect()
    }

    /// Look up a participant by id.
    pub fn get(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == id)
    }

    /// Whether `id` names a living participant.
    pub fn is_alive(&self, id: &ParticipantId) -> bool {
        self.get(id).is_some_and(|p| p.alive)
    }

    /// Living participants by role.
    pub fn counts(&self) -> RosterCounts {
        RosterCounts {
            traitors: self.living_with_role(Role::Traitor).len(),
            faithfuls: self.living_with_role(Role::Faithful).len(),
        }
    }

    /// Mark a participant as eliminated.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTargetError`] if the id is unknown or the
    /// participant is already dead.
    pub fn mark_eliminated(
        &mut self,
        id: &ParticipantId,
        cause: EliminationCause,
        round: u32,
    ) -> Result<&Participant, InvalidTargetError> {
        let participant = self
            .participants
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| InvalidTargetError {
                target: id.to_string(),
                problem: TargetProblem::Unknown,
            })?;
        if !participant.alive {
            return Err(InvalidTargetError {
                target: id.to_string(),
                problem: TargetProblem::AlreadyEliminated,
            });
        }
        participant.alive = false;
        participant.eliminated = Some((cause, round));
        Ok(participant)
    }

    /// Add `amount` to a participant's earnings.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTargetError`] if the id is unknown.
    pub fn credit(&mut self, id: &ParticipantId, amount: Decimal) -> Result<Decimal, InvalidTargetError> {
        let participant = self
            .participants
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| InvalidTargetError {
                target: id.to_string(),
                problem: TargetProblem::Unknown,
            })?;
        participant.earnings = participant.earnings.saturating_add(amount);
        Ok(participant.earnings)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::config::ParticipantConfig;

    fn config(n: usize, traitors: u32) -> GameConfig {
        let mut config = GameConfig::with_participants(
            (0..n)
                .map(|i| ParticipantConfig::new(format!("P{i}"), "m"))
                .collect(),
        );
        config.traitor_count = traitors;
        config
    }

    #[test]
    fn assigns_exact_traitor_count() {
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let registry = Registry::initialize(&config(7, 2), &mut rng).unwrap();
            let counts = registry.counts();
            assert_eq!(counts.traitors, 2);
            assert_eq!(counts.faithfuls, 5);
        }
    }

    #[test]
    fn same_seed_same_roles() {
        let a = Registry::initialize(&config(6, 2), &mut StdRng::seed_from_u64(9)).unwrap();
        let b = Registry::initialize(&config(6, 2), &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_all_traitors() {
        let result = Registry::initialize(&config(3, 3), &mut StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(ConfigError::TraitorCount { .. })));
    }

    #[test]
    fn elimination_is_one_way() {
        let mut registry =
            Registry::initialize(&config(4, 1), &mut StdRng::seed_from_u64(3)).unwrap();
        let id = ParticipantId::new("P1");
        let role = registry.get(&id).unwrap().role;

        registry
            .mark_eliminated(&id, EliminationCause::Banished, 0)
            .unwrap();
        assert!(!registry.is_alive(&id));
        assert_eq!(registry.living().len(), 3);
        assert_eq!(registry.get(&id).unwrap().role, role);

        let again = registry.mark_eliminated(&id, EliminationCause::Murdered, 1);
        assert_eq!(again.unwrap_err().problem, TargetProblem::AlreadyEliminated);
    }

    #[test]
    fn unknown_participant_is_invalid_target() {
        let mut registry =
            Registry::initialize(&config(4, 1), &mut StdRng::seed_from_u64(3)).unwrap();
        let result =
            registry.mark_eliminated(&ParticipantId::new("Zed"), EliminationCause::Murdered, 0);
        assert_eq!(result.unwrap_err().problem, TargetProblem::Unknown);
    }

    #[test]
    fn living_keeps_join_order() {
        let mut registry =
            Registry::initialize(&config(5, 1), &mut StdRng::seed_from_u64(5)).unwrap();
        registry
            .mark_eliminated(&ParticipantId::new("P2"), EliminationCause::Murdered, 0)
            .unwrap();
        let names: Vec<_> = registry.living().iter().map(|p| p.id.to_string()).collect();
        assert_eq!(names, vec!["P0", "P1", "P3", "P4"]);
    }

    #[test]
    fn credit_accumulates() {
        let mut registry =
            Registry::initialize(&config(3, 1), &mut StdRng::seed_from_u64(0)).unwrap();
        let id = ParticipantId::new("P0");
        registry.credit(&id, Decimal::from(40)).unwrap();
        let total = registry.credit(&id, Decimal::from(60)).unwrap();
        assert_eq!(total, Decimal::ONE_HUNDRED);
    }
}
