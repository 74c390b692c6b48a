//! The phase state machine.
//!
//! A [`PhaseMachine`] owns everything one game needs: the roster, the
//! transcript, the decision protocol and the current phase. Each call to
//! [`PhaseMachine::step`] runs exactly one phase and moves to the next:
//!
//! ```text
//! Night -> DayDiscussion -> RoundTableVote -> Banishment -> WinCheck
//!   ^                                                          |
//!   +--------------------- round + 1 <-------------------------+
//!                                                              |
//!                                                          Terminal
//! ```
//!
//! Model output only ever reaches the roster through the decision protocol,
//! and the roster is only mutated through the resolver.

use chrono::{DateTime, Utc};
use tracing::info;
use traitors_types::{
    ActionKind, ActionPayload, Elimination, EliminationCause, EventKind, FinalStanding, GameId,
    GameResult, Outcome, ParticipantId, Phase, Role, Visibility, WinReason,
};

use crate::config::GameConfig;
use crate::conversation;
use crate::decision::{DecisionProtocol, DecisionReport, DecisionRequest};
use crate::error::{GameError, IllegalPhaseError};
use crate::prompt::{EliminatedView, PromptContext};
use crate::registry::{Participant, Registry};
use crate::resolver::{self, Tally, TallyOutcome, TieResolution};
use crate::transcript::Transcript;

/// Votes as `(voter, target)` pairs in voter join order; `None` abstains.
pub type Votes = Vec<(ParticipantId, Option<ParticipantId>)>;

/// One game's state and the logic that advances it.
#[derive(Debug)]
pub struct PhaseMachine {
    game_id: GameId,
    config: GameConfig,
    registry: Registry,
    transcript: Transcript,
    protocol: DecisionProtocol,
    phase: Phase,
    round: u32,
    role_seed: u64,
    pending_murder: Option<ParticipantId>,
    pending_votes: Votes,
    eliminations: Vec<Elimination>,
    started_at: Option<DateTime<Utc>>,
    result: Option<GameResult>,
}

/// State recovered from a recorded game, used to continue it.
#[derive(Debug)]
pub struct RestoredGame {
    /// The original game id.
    pub game_id: GameId,
    /// Roster with recorded eliminations applied.
    pub registry: Registry,
    /// Recorded transcript, up to the last completed round.
    pub transcript: Transcript,
    /// Round to continue with.
    pub round: u32,
    /// The original role seed.
    pub role_seed: u64,
    /// Recorded eliminations, in order.
    pub eliminations: Vec<Elimination>,
    /// When the original game started.
    pub started_at: Option<DateTime<Utc>>,
}

impl PhaseMachine {
    /// Set up a new game at round 0, `Night`, and record the setup events:
    /// the public start, each participant's private role, and the Traitor
    /// roster for the Traitors.
    pub fn new(
        game_id: GameId,
        config: GameConfig,
        registry: Registry,
        protocol: DecisionProtocol,
        role_seed: u64,
    ) -> Self {
        let mut transcript = Transcript::new();
        transcript.push_event(
            0,
            Phase::Night,
            Visibility::Public,
            EventKind::GameStarted {
                game_id,
                participants: registry.all().iter().map(|p| p.id.clone()).collect(),
                role_seed,
            },
        );
        for participant in registry.all() {
            transcript.push_event(
                0,
                Phase::Night,
                Visibility::Participant(participant.id.clone()),
                EventKind::RoleAssigned {
                    participant: participant.id.clone(),
                    role: participant.role,
                },
            );
        }
        transcript.push_event(
            0,
            Phase::Night,
            Visibility::Traitors,
            EventKind::TraitorsRevealed {
                traitors: registry.with_role(Role::Traitor),
            },
        );

        info!(
            game_id = %game_id,
            participants = registry.all().len(),
            traitors = registry.counts().traitors,
            role_seed,
            "game initialized"
        );

        Self {
            game_id,
            config,
            registry,
            transcript,
            protocol,
            phase: Phase::Night,
            round: 0,
            role_seed,
            pending_murder: None,
            pending_votes: Vec::new(),
            eliminations: Vec::new(),
            started_at: None,
            result: None,
        }
    }

    /// Continue a recorded game from the `Night` of `restored.round`.
    pub fn restore(config: GameConfig, protocol: DecisionProtocol, restored: RestoredGame) -> Self {
        info!(
            game_id = %restored.game_id,
            round = restored.round,
            records = restored.transcript.len(),
            "game restored from transcript"
        );
        Self {
            game_id: restored.game_id,
            config,
            registry: restored.registry,
            transcript: restored.transcript,
            protocol,
            phase: Phase::Night,
            round: restored.round,
            role_seed: restored.role_seed,
            pending_murder: None,
            pending_votes: Vec::new(),
            eliminations: restored.eliminations,
            started_at: restored.started_at,
            result: None,
        }
    }

    /// The game id.
    pub const fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Current phase.
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Current round index.
    pub const fn round(&self) -> u32 {
        self.round
    }

    /// The roster.
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The transcript.
    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// The configuration in use.
    pub const fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Seed used for role assignment.
    pub const fn role_seed(&self) -> u64 {
        self.role_seed
    }

    /// The result, once `Terminal` has been reached.
    pub const fn result(&self) -> Option<&GameResult> {
        self.result.as_ref()
    }

    /// Whether the first phase has run.
    pub const fn has_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Run the current phase and move to the next one. `Terminal` is
    /// absorbing: stepping it does nothing.
    pub async fn step(&mut self) -> Result<Phase, GameError> {
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        let next = match self.phase {
            Phase::Night => self.run_night().await?,
            Phase::DayDiscussion => self.run_day_discussion().await?,
            Phase::RoundTableVote => self.run_round_table_vote().await?,
            Phase::Banishment => self.run_banishment().await?,
            Phase::WinCheck => self.run_win_check()?,
            Phase::Terminal => return Ok(Phase::Terminal),
        };
        info!(
            game_id = %self.game_id,
            round = self.round,
            from = %self.phase,
            to = %next,
            "phase transition"
        );
        self.phase = next;
        Ok(next)
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    async fn run_night(&mut self) -> Result<Phase, GameError> {
        self.announce_phase();
        let traitors = self.living_with_role(Role::Traitor);
        let victims: Vec<ParticipantId> = self
            .living_with_role(Role::Faithful)
            .into_iter()
            .map(|p| p.id)
            .collect();
        if traitors.is_empty() || victims.is_empty() {
            return Err(self.illegal("night began without both factions alive").into());
        }

        if self.config.traitor_deliberation && traitors.len() >= 2 {
            for traitor in &traitors {
                let request = self.request(traitor, ActionKind::TraitorMessage, Vec::new());
                let report = self.protocol.decide(&request).await?;
                self.commit(report);
            }
        }

        let requests: Vec<DecisionRequest> = traitors
            .iter()
            .map(|t| self.request(t, ActionKind::MurderVote, victims.clone()))
            .collect();
        let votes = self.collect_votes(&requests).await?;

        let decided = resolver::murder_target(&Tally::count(&votes));
        let (target, count) = decided.map_or((None, 0), |(t, n)| (Some(t), n));
        info!(
            game_id = %self.game_id,
            round = self.round,
            target = target.as_ref().map(ToString::to_string),
            votes = count,
            "murder decided"
        );
        self.push_event(
            Visibility::Traitors,
            EventKind::MurderDecided {
                target: target.clone(),
                votes: count,
            },
        );
        self.pending_murder = target;
        Ok(Phase::DayDiscussion)
    }

    async fn run_day_discussion(&mut self) -> Result<Phase, GameError> {
        self.announce_phase();

        let victim = self.pending_murder.take();
        if let Some(victim) = &victim {
            let elimination = resolver::eliminate(
                &mut self.registry,
                victim,
                EliminationCause::Murdered,
                self.round,
            )?;
            self.eliminations.push(elimination);
        }
        self.push_event(Visibility::Public, EventKind::MurderRevealed { victim });
        self.hold_private_conversations().await?;

        for speaker in self.registry.living().into_iter().cloned().collect::<Vec<_>>() {
            let request = self.request(&speaker, ActionKind::DiscussionStatement, Vec::new());
            let report = self.protocol.decide(&request).await?;
            self.commit(report);
        }
        Ok(Phase::RoundTableVote)
    }

    /// Pairwise private chats ahead of the public discussion. Each message
    /// is committed before the reply is prompted.
    async fn hold_private_conversations(&mut self) -> Result<(), GameError> {
        let arranged = conversation::arrange(
            &self.registry.living_ids(),
            self.config.private_conversations,
            self.config.max_private_messages,
            self.role_seed,
            self.round,
        );
        for conversation in &arranged {
            info!(
                game_id = %self.game_id,
                round = self.round,
                first = %conversation.first,
                second = %conversation.second,
                messages = conversation.messages,
                "private conversation"
            );
            for (sender, recipient) in conversation.turns() {
                let Some(participant) = self.registry.get(sender).cloned() else {
                    return Err(self.illegal("private conversation with an unknown participant").into());
                };
                let mut request = self.request(&participant, ActionKind::PrivateMessage, Vec::new());
                request.context.recipient = Some(recipient.to_string());
                let report = self.protocol.decide(&request).await?;
                self.record(report, Some(recipient.clone()));
            }
        }
        Ok(())
    }

    async fn run_round_table_vote(&mut self) -> Result<Phase, GameError> {
        self.announce_phase();
        let living: Vec<ParticipantId> = self.registry.living_ids();
        self.pending_votes = self.collect_banishment_votes(&living).await?;
        Ok(Phase::Banishment)
    }

    async fn run_banishment(&mut self) -> Result<Phase, GameError> {
        self.announce_phase();
        let votes = std::mem::take(&mut self.pending_votes);
        self.push_event(
            Visibility::Public,
            EventKind::VotesRevealed {
                votes: votes.clone(),
            },
        );

        let banished = match Tally::count(&votes).outcome() {
            TallyOutcome::NoVotes => {
                self.no_banishment(Vec::new(), 0);
                None
            }
            TallyOutcome::Plurality { target, votes } => Some((target, votes)),
            TallyOutcome::Tie { tied, votes } => {
                match resolver::resolve_tie(self.config.tie_break, &tied, self.role_seed, self.round) {
                    TieResolution::Banish(target) => Some((target, votes)),
                    TieResolution::NoElimination => {
                        self.no_banishment(tied, votes);
                        None
                    }
                    TieResolution::Revote(candidates) => self.revote(&candidates).await?,
                }
            }
        };

        if let Some((target, votes)) = banished {
            let elimination = resolver::eliminate(
                &mut self.registry,
                &target,
                EliminationCause::Banished,
                self.round,
            )?;
            let role = self.config.reveal_banished_role.then_some(elimination.role);
            self.eliminations.push(elimination);
            self.push_event(
                Visibility::Public,
                EventKind::Banished {
                    participant: target,
                    votes,
                    role,
                },
            );
        }
        Ok(Phase::WinCheck)
    }

    fn run_win_check(&mut self) -> Result<Phase, GameError> {
        self.announce_phase();
        match resolver::check_win(&self.registry, self.round, self.config.max_rounds)? {
            Some((outcome, reason)) => {
                self.finish(outcome, reason)?;
                Ok(Phase::Terminal)
            }
            None => {
                self.push_event(Visibility::Public, EventKind::RoundCompleted);
                self.round = self.round.saturating_add(1);
                Ok(Phase::Night)
            }
        }
    }

    /// One revote restricted to `candidates`; a second tie banishes nobody.
    async fn revote(&mut self, candidates: &[ParticipantId]) -> Result<Option<(ParticipantId, u32)>, GameError> {
        info!(
            game_id = %self.game_id,
            round = self.round,
            candidates = candidates.len(),
            "round table tie, revote called"
        );
        self.push_event(
            Visibility::Public,
            EventKind::RevoteCalled {
                candidates: candidates.to_vec(),
            },
        );
        let votes = self.collect_banishment_votes(candidates).await?;
        self.push_event(
            Visibility::Public,
            EventKind::VotesRevealed {
                votes: votes.clone(),
            },
        );
        Ok(match Tally::count(&votes).outcome() {
            TallyOutcome::Plurality { target, votes } => Some((target, votes)),
            TallyOutcome::Tie { tied, votes } => {
                self.no_banishment(tied, votes);
                None
            }
            TallyOutcome::NoVotes => {
                self.no_banishment(Vec::new(), 0);
                None
            }
        })
    }

    fn finish(&mut self, outcome: Outcome, reason: WinReason) -> Result<(), GameError> {
        resolver::pay_out(&mut self.registry, outcome, self.config.payout)?;
        self.push_event(Visibility::Public, EventKind::GameEnded { outcome });

        let standings = self
            .registry
            .all()
            .iter()
            .map(|p| FinalStanding {
                participant: p.id.clone(),
                role: p.role,
                model: p.model.clone(),
                alive: p.alive,
                eliminated: p.eliminated.map(|(cause, _)| cause),
                earnings: p.earnings,
            })
            .collect();
        let finished_at = Utc::now();
        let result = GameResult {
            game_id: self.game_id,
            outcome,
            reason,
            rounds_played: self.round.saturating_add(1),
            eliminations: self.eliminations.clone(),
            standings,
            initial_traitors: self.registry.with_role(Role::Traitor),
            initial_faithfuls: self.registry.with_role(Role::Faithful),
            role_seed: self.role_seed,
            started_at: self.started_at.unwrap_or(finished_at),
            finished_at,
        };
        info!(
            game_id = %self.game_id,
            outcome = %outcome,
            reason = ?reason,
            rounds = result.rounds_played,
            "game over"
        );
        self.result = Some(result);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Every living participant votes for one of `candidates` other than
    /// themselves. Votes are gathered concurrently and committed in join
    /// order once all are in.
    async fn collect_banishment_votes(&mut self, candidates: &[ParticipantId]) -> Result<Votes, GameError> {
        let voters: Vec<Participant> = self.registry.living().into_iter().cloned().collect();
        let requests: Vec<DecisionRequest> = voters
            .iter()
            .filter_map(|voter| {
                let choices: Vec<ParticipantId> = candidates
                    .iter()
                    .filter(|c| **c != voter.id)
                    .cloned()
                    .collect();
                (!choices.is_empty())
                    .then(|| self.request(voter, ActionKind::BanishmentVote, choices))
            })
            .collect();
        if requests.is_empty() {
            return Err(self.illegal("round table vote with no eligible voters").into());
        }
        self.collect_votes(&requests).await
    }

    async fn collect_votes(&mut self, requests: &[DecisionRequest]) -> Result<Votes, GameError> {
        let outcomes = self.protocol.decide_all(requests).await;
        let mut reports = Vec::with_capacity(outcomes.len());
        let mut failure = None;
        for outcome in outcomes {
            match outcome {
                Ok(report) => reports.push(report),
                Err(error) => {
                    failure.get_or_insert(error);
                }
            }
        }
        if let Some(error) = failure {
            // keep the model calls that did happen, but cast no votes
            for report in reports {
                let (_, _, attempts) = report.into_parts();
                for exchange in attempts {
                    self.transcript.push_exchange(exchange);
                }
            }
            return Err(error);
        }
        Ok(reports
            .into_iter()
            .map(|report| {
                let voter = report.participant.clone();
                let payload = self.commit(report);
                (voter, payload.target().cloned())
            })
            .collect())
    }

    /// Append a report's attempts and resulting action to the transcript.
    fn commit(&mut self, report: DecisionReport) -> ActionPayload {
        self.record(report, None)
    }

    /// As [`Self::commit`], addressing the action to `recipient` when it is
    /// a private conversation message.
    fn record(&mut self, report: DecisionReport, recipient: Option<ParticipantId>) -> ActionPayload {
        let actor = report.participant.clone();
        let kind = report.kind;
        let (payload, raw_response, attempts) = report.into_parts();
        for exchange in attempts {
            self.transcript.push_exchange(exchange);
        }
        match recipient {
            Some(recipient) => {
                self.transcript
                    .push_private_message(self.round, actor, recipient, payload.clone(), raw_response);
            }
            None => {
                self.transcript.push_action(
                    self.round,
                    self.phase,
                    actor,
                    kind,
                    payload.clone(),
                    raw_response,
                );
            }
        }
        payload
    }

    fn request(&self, participant: &Participant, kind: ActionKind, candidates: Vec<ParticipantId>) -> DecisionRequest {
        DecisionRequest {
            participant: participant.id.clone(),
            role: participant.role,
            model: participant.model.clone(),
            round: self.round,
            phase: self.phase,
            kind,
            candidates,
            roster: self
                .registry
                .all()
                .iter()
                .map(|p| (p.id.clone(), p.alive))
                .collect(),
            context: self.prompt_context(participant),
        }
    }

    fn prompt_context(&self, participant: &Participant) -> PromptContext {
        let fellow_traitors = match participant.role {
            Role::Traitor => self
                .registry
                .with_role(Role::Traitor)
                .into_iter()
                .filter(|id| *id != participant.id)
                .map(|id| id.to_string())
                .collect(),
            Role::Faithful => Vec::new(),
        };
        let eliminated = self
            .eliminations
            .iter()
            .map(|e| {
                let public_role = match e.cause {
                    EliminationCause::Murdered => true,
                    EliminationCause::Banished => self.config.reveal_banished_role,
                };
                EliminatedView {
                    name: e.participant.to_string(),
                    cause: e.cause.to_string(),
                    round: e.round.saturating_add(1),
                    role: public_role.then(|| e.role.to_string()),
                }
            })
            .collect();

        PromptContext {
            name: participant.id.to_string(),
            role: participant.role.to_string(),
            fellow_traitors,
            player_count: self.registry.all().len(),
            round: self.round.saturating_add(1),
            max_rounds: self.config.max_rounds,
            phase: self.phase.to_string(),
            living: self.registry.living_ids().iter().map(ToString::to_string).collect(),
            eliminated,
            history: self.transcript.context_for(
                &participant.id,
                participant.role,
                self.config.context_window,
                self.round,
            ),
            candidates: Vec::new(),
            recipient: None,
            schema: String::new(),
            max_statement_chars: self.protocol.max_statement_chars(),
        }
    }

    fn living_with_role(&self, role: Role) -> Vec<Participant> {
        self.registry
            .living_with_role(role)
            .into_iter()
            .cloned()
            .collect()
    }

    fn announce_phase(&mut self) {
        self.push_event(Visibility::Public, EventKind::PhaseEntered { phase: self.phase });
    }

    fn no_banishment(&mut self, tied: Vec<ParticipantId>, votes: u32) {
        info!(
            game_id = %self.game_id,
            round = self.round,
            tied = tied.len(),
            votes,
            "nobody banished"
        );
        self.push_event(Visibility::Public, EventKind::NoBanishment { tied, votes });
    }

    fn push_event(&mut self, visibility: Visibility, kind: EventKind) {
        self.transcript
            .push_event(self.round, self.phase, visibility, kind);
    }

    fn illegal(&self, reason: &str) -> IllegalPhaseError {
        IllegalPhaseError {
            phase: self.phase,
            round: self.round,
            reason: reason.to_owned(),
        }
    }
}
