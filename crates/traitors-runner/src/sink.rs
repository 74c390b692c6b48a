//! Writing finished games to disk.
//!
//! Each completed game gets its own directory under the output directory,
//! named by game id:
//!
//! - `transcript.jsonl` -- every transcript record, one JSON object per line
//! - `result.json` -- the final [`GameResult`]
//!
//! Nothing is written for a game that did not complete, so the presence of
//! `result.json` always means a finished game.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use traitors_types::{GameResult, Record};

use crate::error::RunnerError;

/// Writes game artifacts under one output directory.
#[derive(Debug, Clone)]
pub struct ResultSink {
    root: PathBuf,
}

impl ResultSink {
    /// A sink writing under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write one finished game and return its directory.
    pub async fn write(&self, result: &GameResult, records: &[Record]) -> Result<PathBuf, RunnerError> {
        let dir = self.root.join(result.game_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        tokio::fs::write(dir.join("transcript.jsonl"), to_json_lines(records)?).await?;
        // result last, so its presence marks a complete directory
        tokio::fs::write(dir.join("result.json"), serde_json::to_vec_pretty(result)?).await?;
        Ok(dir)
    }

    /// Root output directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn to_json_lines(records: &[Record]) -> Result<String, RunnerError> {
    let mut out = String::new();
    for record in records {
        let line = serde_json::to_string(record)?;
        // writing to a String cannot fail
        let _ = writeln!(out, "{line}");
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use traitors_core::{
        FnModel, GameConfig, GameController, ModelCapability, ModelCatalog, ModelRequest,
        ParticipantConfig,
    };

    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!(
            "traitors_sink_test_{}_{:?}",
            std::process::id(),
            std::thread::current().id()
        ))
    }

    #[tokio::test]
    async fn writes_transcript_lines_and_result() {
        let model: Arc<dyn ModelCapability> = Arc::new(FnModel::new(|req: &ModelRequest| {
            Ok(match req.candidates.last() {
                Some(t) => format!("{{\"target\": \"{t}\"}}"),
                None => "{\"statement\": \"hi\"}".to_owned(),
            })
        }));
        let mut config = GameConfig::with_participants(
            ["A", "B", "C", "D"]
                .iter()
                .map(|n| ParticipantConfig::new(*n, "m"))
                .collect(),
        );
        config.seed = Some(1);
        let mut game = GameController::new(config, ModelCatalog::uniform(["m"], &model)).unwrap();
        let result = game.start().await.unwrap().clone();

        let root = temp_root();
        let sink = ResultSink::new(&root);
        let dir = sink.write(&result, game.transcript().records()).await.unwrap();

        let lines = std::fs::read_to_string(dir.join("transcript.jsonl")).unwrap();
        assert_eq!(lines.lines().count(), game.transcript().len());
        let first: Record = serde_json::from_str(lines.lines().next().unwrap()).unwrap();
        assert_eq!(first.seq(), 1);

        let written: GameResult =
            serde_json::from_slice(&std::fs::read(dir.join("result.json")).unwrap()).unwrap();
        assert_eq!(written, result);

        std::fs::remove_dir_all(&root).ok();
    }
}
