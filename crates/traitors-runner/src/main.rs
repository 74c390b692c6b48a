//! Benchmark runner for the Traitors agent game.
//!
//! Plays a batch of independent games between LLM-backed participants and
//! writes each finished game's transcript and result to disk.
//!
//! # Architecture
//!
//! ```text
//! bench YAML --> model catalog (HTTP backends) --> N x GameController --> ResultSink
//! ```
//!
//! Games run concurrently up to `max_parallel_games`. A game that fails or
//! is cancelled writes nothing; if any game fails the process exits
//! nonzero.

mod config;
mod error;
mod llm;
mod sink;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use traitors_core::prompt::PromptEngine;
use traitors_core::{GameController, ModelCatalog};

use crate::config::BenchConfig;
use crate::llm::build_catalog;
use crate::sink::ResultSink;

/// Bench file used when none is given on the command line or in
/// `TRAITORS_CONFIG`.
const DEFAULT_CONFIG: &str = "traitors-bench.yaml";

/// Application entry point.
///
/// Initializes logging, loads the bench file, sets up LLM backends and
/// prompt templates, then plays every game.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("traitors-runner starting");

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TRAITORS_CONFIG").ok())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    let bench = BenchConfig::from_file(&path)
        .with_context(|| format!("loading bench config {}", path.display()))?;
    info!(
        config = %path.display(),
        games = bench.games,
        max_parallel_games = bench.max_parallel_games,
        participants = bench.game.participants.len(),
        traitors = bench.game.traitor_count,
        "configuration loaded"
    );

    let catalog = build_catalog(&bench.models)?;
    let prompts = Arc::new(match &bench.templates_dir {
        Some(dir) => PromptEngine::from_dir(dir)
            .with_context(|| format!("loading templates from {}", dir.display()))?,
        None => PromptEngine::new()?,
    });
    let sink = ResultSink::new(&bench.output_dir);
    info!(output_dir = %sink.root().display(), "writing results");

    let outcomes: Vec<bool> = futures::stream::iter(0..bench.games)
        .map(|index| play(&bench, index, &catalog, &prompts, &sink))
        .buffer_unordered(bench.max_parallel_games)
        .collect()
        .await;

    let completed = outcomes.iter().filter(|ok| **ok).count();
    let failed = outcomes.len().saturating_sub(completed);
    info!(completed, failed, "benchmark finished");

    if failed > 0 {
        anyhow::bail!("{failed} of {} games failed", outcomes.len());
    }
    Ok(())
}

/// Play one game to completion and write it out. Returns whether it
/// completed and was written.
async fn play(
    bench: &BenchConfig,
    index: u32,
    catalog: &ModelCatalog,
    prompts: &Arc<PromptEngine>,
    sink: &ResultSink,
) -> bool {
    let mut game = match GameController::with_prompts(
        bench.game_for(index),
        catalog.clone(),
        Arc::clone(prompts),
    ) {
        Ok(game) => game,
        Err(e) => {
            error!(game = index, error = %e, "game setup failed");
            return false;
        }
    };
    let game_id = game.game_id();
    info!(game = index, game_id = %game_id, role_seed = game.role_seed(), "game started");

    let result = match game.start().await {
        Ok(result) => result.clone(),
        Err(e) => {
            error!(game = index, game_id = %game_id, error = %e, "game did not complete");
            return false;
        }
    };

    match sink.write(&result, game.transcript().records()).await {
        Ok(dir) => {
            info!(
                game = index,
                game_id = %result.game_id,
                outcome = %result.outcome,
                rounds = result.rounds_played,
                dir = %dir.display(),
                "game written"
            );
            true
        }
        Err(e) => {
            error!(game = index, game_id = %result.game_id, error = %e, "failed to write game");
            false
        }
    }
}
