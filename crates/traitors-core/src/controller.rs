//! The game controller: the public entry point for running one game.
//!
//! The controller validates configuration against the model catalog,
//! assigns roles, and drives the [`PhaseMachine`] to `Terminal`. Its
//! lifecycle state is published on a `tokio::sync::watch` channel so a
//! [`GameMonitor`] held by another task can observe progress and request
//! cancellation. Cancellation takes effect between phases only.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tracing::{error, info, warn};
use traitors_types::{GameId, GameResult, GameStatus, ParticipantId, Phase, Record, RunState};

use crate::capability::ModelCatalog;
use crate::config::GameConfig;
use crate::decision::DecisionProtocol;
use crate::error::{ConfigError, GameError, IllegalPhaseError, NotCompletedError};
use crate::phase::PhaseMachine;
use crate::prompt::PromptEngine;
use crate::registry::Registry;
use crate::replay;
use crate::transcript::Transcript;

/// Runs one game.
#[derive(Debug)]
pub struct GameController {
    machine: PhaseMachine,
    state: RunState,
    status: watch::Sender<GameStatus>,
    cancel: Arc<AtomicBool>,
}

/// A cloneable handle for observing a running game from another task.
#[derive(Debug, Clone)]
pub struct GameMonitor {
    status: watch::Receiver<GameStatus>,
    cancel: Arc<AtomicBool>,
}

impl GameMonitor {
    /// Latest status snapshot.
    pub fn status(&self) -> GameStatus {
        *self.status.borrow()
    }

    /// Wait for the next status change. Returns `false` once the
    /// controller has been dropped.
    pub async fn changed(&mut self) -> bool {
        self.status.changed().await.is_ok()
    }

    /// Ask the controller to stop before its next phase.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

impl GameController {
    /// Validate the configuration and set up a new game with the built-in
    /// prompt templates.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Config`] if the configuration is invalid or a
    /// participant's model is not in `catalog`.
    pub fn new(config: GameConfig, catalog: ModelCatalog) -> Result<Self, GameError> {
        let prompts = Arc::new(PromptEngine::new()?);
        Self::with_prompts(config, catalog, prompts)
    }

    /// Like [`GameController::new`], rendering prompts with `prompts`.
    pub fn with_prompts(
        config: GameConfig,
        catalog: ModelCatalog,
        prompts: Arc<PromptEngine>,
    ) -> Result<Self, GameError> {
        check_catalog(&config, &catalog)?;

        let role_seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = StdRng::seed_from_u64(role_seed);
        let registry = Registry::initialize(&config, &mut rng)?;
        let protocol = protocol(&config, catalog, prompts);

        let machine = PhaseMachine::new(GameId::new(), config, registry, protocol, role_seed);
        Ok(Self::from_machine(machine))
    }

    /// Continue a recorded game from the `Night` after its last completed
    /// round.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Config`] for an invalid configuration and
    /// [`GameError::Replay`] if `records` cannot be replayed against it.
    pub fn resume(config: GameConfig, catalog: ModelCatalog, records: Vec<Record>) -> Result<Self, GameError> {
        let prompts = Arc::new(PromptEngine::new()?);
        Self::resume_with_prompts(config, catalog, records, prompts)
    }

    /// Like [`GameController::resume`], rendering prompts with `prompts`.
    pub fn resume_with_prompts(
        config: GameConfig,
        catalog: ModelCatalog,
        records: Vec<Record>,
        prompts: Arc<PromptEngine>,
    ) -> Result<Self, GameError> {
        check_catalog(&config, &catalog)?;
        let restored = replay::restore(&config, records)?;
        let protocol = protocol(&config, catalog, prompts);
        Ok(Self::from_machine(PhaseMachine::restore(config, protocol, restored)))
    }

    fn from_machine(machine: PhaseMachine) -> Self {
        let initial = GameStatus {
            phase: machine.phase(),
            round: machine.round(),
            state: RunState::NotStarted,
        };
        let (status, _) = watch::channel(initial);
        Self {
            machine,
            state: RunState::NotStarted,
            status,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run the game to completion.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Cancelled`] if cancelled through a monitor, or
    /// the fatal error that stopped the game. Neither produces a result.
    pub async fn start(&mut self) -> Result<&GameResult, GameError> {
        info!(game_id = %self.machine.game_id(), "game starting");
        while self.machine.phase() != Phase::Terminal {
            self.step().await?;
        }
        Ok(self.result()?)
    }

    /// Run exactly one phase and return the phase now current.
    ///
    /// # Errors
    ///
    /// As for [`GameController::start`]. A failed or cancelled game stays
    /// that way; stepping it again returns an error without running a
    /// phase.
    pub async fn step(&mut self) -> Result<Phase, GameError> {
        match self.state {
            RunState::Completed => return Ok(Phase::Terminal),
            RunState::Cancelled => return Err(GameError::Cancelled),
            RunState::Failed => {
                return Err(IllegalPhaseError {
                    phase: self.machine.phase(),
                    round: self.machine.round(),
                    reason: "the game has already failed".to_owned(),
                }
                .into());
            }
            RunState::NotStarted | RunState::Running => {}
        }

        if self.cancel.load(Ordering::Acquire) {
            warn!(
                game_id = %self.machine.game_id(),
                phase = %self.machine.phase(),
                round = self.machine.round(),
                "game cancelled"
            );
            self.publish(RunState::Cancelled);
            return Err(GameError::Cancelled);
        }

        self.publish(RunState::Running);
        match self.machine.step().await {
            Ok(Phase::Terminal) => {
                self.publish(RunState::Completed);
                Ok(Phase::Terminal)
            }
            Ok(phase) => {
                self.publish(RunState::Running);
                Ok(phase)
            }
            Err(e) => {
                error!(
                    game_id = %self.machine.game_id(),
                    phase = %self.machine.phase(),
                    round = self.machine.round(),
                    error = %e,
                    "game failed"
                );
                self.publish(RunState::Failed);
                Err(e)
            }
        }
    }

    fn publish(&mut self, state: RunState) {
        self.state = state;
        self.status.send_replace(self.status());
    }

    /// Current phase, round and lifecycle state.
    pub const fn status(&self) -> GameStatus {
        GameStatus {
            phase: self.machine.phase(),
            round: self.machine.round(),
            state: self.state,
        }
    }

    /// The final result. Every call after completion returns the same one.
    ///
    /// # Errors
    ///
    /// Returns [`NotCompletedError`] until the game reaches `Terminal`.
    pub fn result(&self) -> Result<&GameResult, NotCompletedError> {
        self.machine.result().ok_or(NotCompletedError {
            state: self.state,
            phase: self.machine.phase(),
        })
    }

    /// A handle for observing and cancelling this game from elsewhere.
    pub fn monitor(&self) -> GameMonitor {
        GameMonitor {
            status: self.status.subscribe(),
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// The game id.
    pub const fn game_id(&self) -> GameId {
        self.machine.game_id()
    }

    /// The audit trail so far.
    pub const fn transcript(&self) -> &Transcript {
        self.machine.transcript()
    }

    /// The roster.
    pub const fn registry(&self) -> &Registry {
        self.machine.registry()
    }

    /// Seed the roles were drawn with.
    pub const fn role_seed(&self) -> u64 {
        self.machine.role_seed()
    }
}

/// Every participant's model must resolve before any game state exists.
fn check_catalog(config: &GameConfig, catalog: &ModelCatalog) -> Result<(), ConfigError> {
    config.validate()?;
    for participant in &config.participants {
        if !catalog.contains(&participant.model) {
            return Err(ConfigError::UnknownModel {
                participant: ParticipantId::new(participant.name.as_str()),
                model: participant.model.clone(),
            });
        }
    }
    Ok(())
}

fn protocol(config: &GameConfig, catalog: ModelCatalog, prompts: Arc<PromptEngine>) -> DecisionProtocol {
    DecisionProtocol::new(
        prompts,
        catalog,
        config.retry_bound,
        config.decision_timeout(),
        config.max_statement_chars,
        config.max_concurrent_decisions,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use traitors_types::ParticipantId;

    use super::*;
    use crate::capability::{FnModel, ModelCapability, ModelRequest};
    use crate::config::ParticipantConfig;

    fn catalog() -> ModelCatalog {
        let model: Arc<dyn ModelCapability> = Arc::new(FnModel::new(|req: &ModelRequest| {
            Ok(match req.candidates.first() {
                Some(t) => format!("{{\"target\": \"{t}\"}}"),
                None => "{\"statement\": \"hello\"}".to_owned(),
            })
        }));
        ModelCatalog::uniform(["m"], &model)
    }

    fn config(seed: u64) -> GameConfig {
        let mut config = GameConfig::with_participants(
            ["A", "B", "C", "D"]
                .iter()
                .map(|n| ParticipantConfig::new(*n, "m"))
                .collect(),
        );
        config.seed = Some(seed);
        config
    }

    #[test]
    fn fixed_seed_reproduces_roles() {
        let first = GameController::new(config(42), catalog()).unwrap();
        let second = GameController::new(config(42), catalog()).unwrap();
        assert_eq!(first.registry(), second.registry());
        assert_eq!(first.role_seed(), 42);
    }

    #[test]
    fn unknown_model_is_a_config_error() {
        let mut config = config(1);
        if let Some(p) = config.participants.get_mut(2) {
            p.model = "missing".to_owned();
        }
        let err = GameController::new(config, catalog()).unwrap_err();
        assert!(matches!(
            err,
            GameError::Config {
                source: ConfigError::UnknownModel { ref participant, .. }
            } if *participant == ParticipantId::new("C")
        ));
    }

    #[tokio::test]
    async fn status_moves_from_not_started_to_completed() {
        let mut controller = GameController::new(config(3), catalog()).unwrap();
        let monitor = controller.monitor();
        assert_eq!(controller.status().state, RunState::NotStarted);
        assert!(controller.result().is_err());

        controller.start().await.unwrap();
        assert_eq!(controller.status().state, RunState::Completed);
        assert_eq!(controller.status().phase, Phase::Terminal);
        assert_eq!(monitor.status(), controller.status());
    }

    #[tokio::test]
    async fn cancellation_stops_before_the_next_phase() {
        let mut controller = GameController::new(config(3), catalog()).unwrap();
        let monitor = controller.monitor();
        controller.step().await.unwrap();
        monitor.cancel();

        assert!(matches!(controller.start().await, Err(GameError::Cancelled)));
        assert_eq!(controller.status().state, RunState::Cancelled);
        assert_eq!(controller.status().phase, Phase::DayDiscussion);
        assert!(controller.result().is_err());
        assert!(matches!(controller.step().await, Err(GameError::Cancelled)));
    }
}
