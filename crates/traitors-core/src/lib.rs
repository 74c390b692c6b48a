//! Game engine for The Traitors played by language-model agents.
//!
//! A fixed table of participants is secretly split into Traitors and
//! Faithfuls. Each round runs Night (Traitors choose a victim), Day
//! Discussion, the Round Table vote and Banishment, then checks for a
//! winner. Every agent decision goes through a validated decision protocol
//! and every prompt, response, action and announcement is kept in one
//! append-only transcript.
//!
//! # Modules
//!
//! - [`capability`] -- The [`ModelCapability`] seam and test models.
//! - [`config`] -- Game configuration loaded from YAML.
//! - [`controller`] -- [`GameController`]: setup, run, status, result.
//! - [`conversation`] -- Seeded pairings for private daytime chats.
//! - [`decision`] -- Prompt, call, parse, retry for one decision.
//! - [`error`] -- Error taxonomy.
//! - [`parse`] -- Recovering and validating JSON from model output.
//! - [`phase`] -- The phase state machine.
//! - [`prompt`] -- `minijinja` prompt templates.
//! - [`registry`] -- The participant roster.
//! - [`replay`] -- Resuming a game from its recorded transcript.
//! - [`resolver`] -- Vote tallies, eliminations, win checks, payouts.
//! - [`transcript`] -- The append-only audit trail.
//!
//! [`ModelCapability`]: capability::ModelCapability
//! [`GameController`]: controller::GameController

pub mod capability;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod decision;
pub mod error;
pub mod parse;
pub mod phase;
pub mod prompt;
pub mod registry;
pub mod replay;
pub mod resolver;
pub mod transcript;

pub use capability::{FnModel, ModelCapability, ModelCatalog, ModelError, ModelRequest, ScriptedModel};
pub use config::{ContextWindow, GameConfig, ParticipantConfig, PayoutPolicy, TieBreakPolicy};
pub use controller::{GameController, GameMonitor};
pub use error::{ConfigError, GameError, NotCompletedError};
