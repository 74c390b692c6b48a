//! Win and elimination resolution.
//!
//! Pure functions over the registry: vote tallies, tie handling, the
//! terminal-condition check, and payouts. The resolver is the only code
//! that mutates the registry.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rust_decimal::Decimal;
use tracing::info;
use traitors_types::{
    Elimination, EliminationCause, Faction, Outcome, ParticipantId, Phase, Role, WinReason,
};

use crate::config::{PayoutPolicy, TieBreakPolicy};
use crate::error::{IllegalPhaseError, InvalidTargetError};
use crate::registry::Registry;

/// Votes received per candidate, in order of first nomination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    counts: Vec<(ParticipantId, u32)>,
}

/// What a tally decides on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TallyOutcome {
    /// Nobody cast a valid vote.
    NoVotes,
    /// One candidate has strictly the most votes.
    Plurality {
        /// The leading candidate.
        target: ParticipantId,
        /// Their vote count.
        votes: u32,
    },
    /// Several candidates share the most votes.
    Tie {
        /// Tied candidates in order of first nomination.
        tied: Vec<ParticipantId>,
        /// The shared count.
        votes: u32,
    },
}

impl Tally {
    /// Count `(voter, target)` pairs; abstentions (`None`) are ignored.
    pub fn count<'a, I>(votes: I) -> Self
    where
        I: IntoIterator<Item = &'a (ParticipantId, Option<ParticipantId>)>,
    {
        let mut counts: Vec<(ParticipantId, u32)> = Vec::new();
        for target in votes.into_iter().filter_map(|(_, target)| target.as_ref()) {
            match counts.iter_mut().find(|(candidate, _)| candidate == target) {
                Some((_, n)) => *n = n.saturating_add(1),
                None => counts.push((target.clone(), 1)),
            }
        }
        Self { counts }
    }

    /// Votes for one candidate.
    pub fn votes_for(&self, candidate: &ParticipantId) -> u32 {
        self.counts
            .iter()
            .find(|(c, _)| c == candidate)
            .map_or(0, |(_, n)| *n)
    }

    /// Decide plurality, tie, or no votes.
    pub fn outcome(&self) -> TallyOutcome {
        let Some(top) = self.counts.iter().map(|(_, n)| *n).max() else {
            return TallyOutcome::NoVotes;
        };
        let leaders: Vec<ParticipantId> = self
            .counts
            .iter()
            .filter(|(_, n)| *n == top)
            .map(|(c, _)| c.clone())
            .collect();
        if leaders.len() > 1 {
            return TallyOutcome::Tie {
                tied: leaders,
                votes: top,
            };
        }
        leaders
            .into_iter()
            .next()
            .map_or(TallyOutcome::NoVotes, |target| TallyOutcome::Plurality { target, votes: top })
    }
}

/// How a Round Table tie is settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TieResolution {
    /// Banish this candidate.
    Banish(ParticipantId),
    /// Nobody is banished.
    NoElimination,
    /// Vote again among these candidates.
    Revote(Vec<ParticipantId>),
}

/// Apply the tie-break policy to a first-round tie.
///
/// `tied` is in order of first nomination. For [`TieBreakPolicy::Revote`]
/// the caller runs the revote and settles a second tie with
/// [`TieResolution::NoElimination`].
pub fn resolve_tie(policy: TieBreakPolicy, tied: &[ParticipantId], role_seed: u64, round: u32) -> TieResolution {
    match policy {
        TieBreakPolicy::NoElimination => TieResolution::NoElimination,
        TieBreakPolicy::FirstNominated => tied
            .first()
            .cloned()
            .map_or(TieResolution::NoElimination, TieResolution::Banish),
        TieBreakPolicy::Revote => TieResolution::Revote(tied.to_vec()),
        TieBreakPolicy::SeededRandom => {
            let mut rng = StdRng::seed_from_u64(role_seed.wrapping_add(u64::from(round)));
            tied.choose(&mut rng)
                .cloned()
                .map_or(TieResolution::NoElimination, TieResolution::Banish)
        }
    }
}

/// Settle the murder vote: plurality wins, a tie goes to the candidate
/// nominated first, and no valid votes means no murder.
pub fn murder_target(tally: &Tally) -> Option<(ParticipantId, u32)> {
    match tally.outcome() {
        TallyOutcome::NoVotes => None,
        TallyOutcome::Plurality { target, votes } => Some((target, votes)),
        TallyOutcome::Tie { tied, votes } => tied.into_iter().next().map(|t| (t, votes)),
    }
}

/// Eliminate a participant and return the history entry.
///
/// # Errors
///
/// Returns [`InvalidTargetError`] if the participant is unknown or already
/// eliminated. Validated decisions never name such a target, so this
/// indicates an engine fault.
pub fn eliminate(
    registry: &mut Registry,
    participant: &ParticipantId,
    cause: EliminationCause,
    round: u32,
) -> Result<Elimination, InvalidTargetError> {
    let eliminated = registry.mark_eliminated(participant, cause, round)?;
    info!(
        participant = %eliminated.id,
        role = %eliminated.role,
        cause = %cause,
        round,
        "participant eliminated"
    );
    Ok(Elimination {
        round,
        cause,
        participant: eliminated.id.clone(),
        role: eliminated.role,
    })
}

/// Evaluate the terminal conditions, in order:
///
/// 1. no living Traitors: Faithfuls win
/// 2. living Traitors at least equal living Faithfuls: Traitors win
/// 3. `round + 1 >= max_rounds`: draw
///
/// # Errors
///
/// Returns [`IllegalPhaseError`] if the roster no longer adds up.
pub fn check_win(
    registry: &Registry,
    round: u32,
    max_rounds: u32,
) -> Result<Option<(Outcome, WinReason)>, IllegalPhaseError> {
    assert_conservation(registry, round)?;
    let counts = registry.counts();

    if counts.traitors == 0 {
        return Ok(Some((
            Outcome::Winner {
                faction: Faction::Faithfuls,
            },
            WinReason::AllTraitorsEliminated,
        )));
    }
    if counts.traitors >= counts.faithfuls {
        return Ok(Some((
            Outcome::Winner {
                faction: Faction::Traitors,
            },
            WinReason::TraitorParity,
        )));
    }
    if round.saturating_add(1) >= max_rounds {
        return Ok(Some((Outcome::Draw, WinReason::MaxRoundsReached)));
    }
    Ok(None)
}

/// Living Traitors plus living Faithfuls must equal the living roster, and
/// living plus eliminated must equal the table.
pub fn assert_conservation(registry: &Registry, round: u32) -> Result<(), IllegalPhaseError> {
    let counts = registry.counts();
    let living = registry.living().len();
    let dead = registry.all().iter().filter(|p| !p.alive).count();
    let by_role = counts.traitors.checked_add(counts.faithfuls);
    let total = living.checked_add(dead);
    if by_role == Some(living) && total == Some(registry.all().len()) {
        return Ok(());
    }
    Err(IllegalPhaseError {
        phase: Phase::WinCheck,
        round,
        reason: format!(
            "roster conservation violated: {} traitors + {} faithfuls alive, {living} living, {dead} eliminated",
            counts.traitors, counts.faithfuls
        ),
    })
}

/// Credit the living members of the winning faction. Draws pay nothing.
///
/// A split pool is divided evenly and rounded to two decimal places.
pub fn pay_out(
    registry: &mut Registry,
    outcome: Outcome,
    policy: PayoutPolicy,
) -> Result<Vec<(ParticipantId, Decimal)>, InvalidTargetError> {
    let Some(faction) = outcome.winner() else {
        return Ok(Vec::new());
    };
    let role = match faction {
        Faction::Traitors => Role::Traitor,
        Faction::Faithfuls => Role::Faithful,
    };
    let survivors: Vec<ParticipantId> = registry
        .living_with_role(role)
        .into_iter()
        .map(|p| p.id.clone())
        .collect();
    if survivors.is_empty() {
        return Ok(Vec::new());
    }

    let share = match policy {
        PayoutPolicy::PerSurvivor { amount } => amount,
        PayoutPolicy::SplitPool { pool } => pool
            .checked_div(Decimal::from(survivors.len()))
            .unwrap_or(Decimal::ZERO)
            .round_dp(2),
    };

    let mut paid = Vec::with_capacity(survivors.len());
    for id in survivors {
        registry.credit(&id, share)?;
        paid.push((id, share));
    }
    Ok(paid)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{GameConfig, ParticipantConfig};

    fn id(name: &str) -> ParticipantId {
        ParticipantId::new(name)
    }

    fn vote(voter: &str, target: Option<&str>) -> (ParticipantId, Option<ParticipantId>) {
        (id(voter), target.map(id))
    }

    fn registry(roles: &[(&str, Role)]) -> Registry {
        let config = GameConfig::with_participants(
            roles
                .iter()
                .map(|(name, _)| ParticipantConfig::new(*name, "m"))
                .collect(),
        );
        let roles: Vec<Role> = roles.iter().map(|(_, r)| *r).collect();
        Registry::with_roles(&config, &roles)
    }

    #[test]
    fn plurality_wins() {
        let votes = [
            vote("A", Some("C")),
            vote("B", Some("C")),
            vote("C", Some("A")),
            vote("D", None),
        ];
        assert_eq!(
            Tally::count(&votes).outcome(),
            TallyOutcome::Plurality {
                target: id("C"),
                votes: 2
            }
        );
    }

    #[test]
    fn tie_lists_candidates_in_nomination_order() {
        let votes = [
            vote("A", Some("D")),
            vote("B", Some("C")),
            vote("C", Some("D")),
            vote("D", Some("C")),
        ];
        assert_eq!(
            Tally::count(&votes).outcome(),
            TallyOutcome::Tie {
                tied: vec![id("D"), id("C")],
                votes: 2
            }
        );
    }

    #[test]
    fn all_abstain_is_no_votes() {
        let votes = [vote("A", None), vote("B", None)];
        assert_eq!(Tally::count(&votes).outcome(), TallyOutcome::NoVotes);
        assert_eq!(murder_target(&Tally::count(&votes)), None);
    }

    #[test]
    fn murder_tie_goes_to_first_nominated() {
        let votes = [vote("T1", Some("F2")), vote("T2", Some("F1"))];
        assert_eq!(murder_target(&Tally::count(&votes)), Some((id("F2"), 1)));
    }

    #[test]
    fn tie_policies() {
        let tied = [id("X"), id("Y")];
        assert_eq!(
            resolve_tie(TieBreakPolicy::NoElimination, &tied, 1, 0),
            TieResolution::NoElimination
        );
        assert_eq!(
            resolve_tie(TieBreakPolicy::FirstNominated, &tied, 1, 0),
            TieResolution::Banish(id("X"))
        );
        assert_eq!(
            resolve_tie(TieBreakPolicy::Revote, &tied, 1, 0),
            TieResolution::Revote(tied.to_vec())
        );
        let random = resolve_tie(TieBreakPolicy::SeededRandom, &tied, 42, 3);
        assert!(matches!(&random, TieResolution::Banish(p) if tied.contains(p)));
        assert_eq!(random, resolve_tie(TieBreakPolicy::SeededRandom, &tied, 42, 3));
    }

    #[test]
    fn faithfuls_win_when_no_traitors_remain() {
        let mut reg = registry(&[("T", Role::Traitor), ("A", Role::Faithful), ("B", Role::Faithful)]);
        eliminate(&mut reg, &id("T"), EliminationCause::Banished, 0).unwrap();
        assert_eq!(
            check_win(&reg, 0, 10).unwrap(),
            Some((
                Outcome::Winner {
                    faction: Faction::Faithfuls
                },
                WinReason::AllTraitorsEliminated
            ))
        );
    }

    #[test]
    fn traitors_win_at_parity() {
        let mut reg = registry(&[("T", Role::Traitor), ("A", Role::Faithful), ("B", Role::Faithful)]);
        eliminate(&mut reg, &id("A"), EliminationCause::Murdered, 0).unwrap();
        assert_eq!(
            check_win(&reg, 0, 10).unwrap().map(|(_, reason)| reason),
            Some(WinReason::TraitorParity)
        );
    }

    #[test]
    fn draw_at_round_limit_only_after_faction_checks() {
        let reg = registry(&[
            ("T", Role::Traitor),
            ("A", Role::Faithful),
            ("B", Role::Faithful),
        ]);
        assert_eq!(check_win(&reg, 0, 2).unwrap(), None);
        assert_eq!(
            check_win(&reg, 1, 2).unwrap(),
            Some((Outcome::Draw, WinReason::MaxRoundsReached))
        );
    }

    #[test]
    fn per_survivor_payout_only_to_living_winners() {
        let mut reg = registry(&[
            ("T", Role::Traitor),
            ("A", Role::Faithful),
            ("B", Role::Faithful),
            ("C", Role::Faithful),
        ]);
        eliminate(&mut reg, &id("A"), EliminationCause::Murdered, 0).unwrap();
        eliminate(&mut reg, &id("T"), EliminationCause::Banished, 0).unwrap();
        let paid = pay_out(
            &mut reg,
            Outcome::Winner {
                faction: Faction::Faithfuls,
            },
            PayoutPolicy::PerSurvivor {
                amount: Decimal::ONE_HUNDRED,
            },
        )
        .unwrap();
        assert_eq!(paid.len(), 2);
        assert_eq!(reg.get(&id("B")).unwrap().earnings, Decimal::ONE_HUNDRED);
        assert_eq!(reg.get(&id("A")).unwrap().earnings, Decimal::ZERO);
        assert_eq!(reg.get(&id("T")).unwrap().earnings, Decimal::ZERO);
    }

    #[test]
    fn split_pool_divides_evenly() {
        let mut reg = registry(&[
            ("T", Role::Traitor),
            ("A", Role::Faithful),
            ("B", Role::Faithful),
            ("C", Role::Faithful),
        ]);
        eliminate(&mut reg, &id("T"), EliminationCause::Banished, 0).unwrap();
        pay_out(
            &mut reg,
            Outcome::Winner {
                faction: Faction::Faithfuls,
            },
            PayoutPolicy::SplitPool {
                pool: Decimal::from(100),
            },
        )
        .unwrap();
        assert_eq!(reg.get(&id("A")).unwrap().earnings, Decimal::new(3333, 2));
    }

    #[test]
    fn draw_pays_nothing() {
        let mut reg = registry(&[("T", Role::Traitor), ("A", Role::Faithful), ("B", Role::Faithful)]);
        let paid = pay_out(&mut reg, Outcome::Draw, PayoutPolicy::default()).unwrap();
        assert!(paid.is_empty());
    }

    #[test]
    fn random_roles_always_conserve() {
        let config = GameConfig::with_participants(
            (0..6).map(|i| ParticipantConfig::new(format!("P{i}"), "m")).collect(),
        );
        let mut reg = Registry::initialize(&config, &mut StdRng::seed_from_u64(11)).unwrap();
        for (round, name) in ["P0", "P3", "P5"].into_iter().enumerate() {
            eliminate(
                &mut reg,
                &id(name),
                EliminationCause::Banished,
                u32::try_from(round).unwrap(),
            )
            .unwrap();
            assert!(assert_conservation(&reg, 0).is_ok());
        }
    }
}
