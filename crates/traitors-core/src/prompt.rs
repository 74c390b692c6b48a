//! Prompt template loading and rendering via `minijinja`.
//!
//! Default templates are compiled into the crate. [`PromptEngine::from_dir`]
//! lets an operator override any of them from a directory of `.j2` files
//! without recompiling; templates missing from the directory fall back to
//! the built-in versions.

use std::path::Path;

use minijinja::Environment;
use serde::Serialize;
use traitors_types::ActionKind;

use crate::error::PromptError;

/// Template names, paired with the compiled-in defaults.
const TEMPLATES: &[(&str, &str)] = &[
    ("system", include_str!("../templates/system.j2")),
    ("context", include_str!("../templates/context.j2")),
    ("traitor_message", include_str!("../templates/traitor_message.j2")),
    ("murder_vote", include_str!("../templates/murder_vote.j2")),
    ("private_message", include_str!("../templates/private_message.j2")),
    (
        "discussion_statement",
        include_str!("../templates/discussion_statement.j2"),
    ),
    ("banishment_vote", include_str!("../templates/banishment_vote.j2")),
    ("correction", include_str!("../templates/correction.j2")),
];

/// The complete rendered prompt ready to send to a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    /// System message establishing the participant's identity and the rules.
    pub system: String,
    /// User message with game state, history and the task.
    pub user: String,
}

/// An eliminated participant as shown in prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EliminatedView {
    /// Participant name.
    pub name: String,
    /// `murdered` or `banished`.
    pub cause: String,
    /// 1-based round of elimination.
    pub round: u32,
    /// Role, when it has been made public.
    pub role: Option<String>,
}

/// Everything the templates can reference for one decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptContext {
    /// Prompted participant.
    pub name: String,
    /// `traitor` or `faithful`.
    pub role: String,
    /// Fellow Traitors (empty for Faithfuls).
    pub fellow_traitors: Vec<String>,
    /// Players at the start of the game.
    pub player_count: usize,
    /// 1-based round number.
    pub round: u32,
    /// Round limit.
    pub max_rounds: u32,
    /// Current phase label.
    pub phase: String,
    /// Living players in join order.
    pub living: Vec<String>,
    /// Eliminations so far.
    pub eliminated: Vec<EliminatedView>,
    /// Visible history lines.
    pub history: Vec<String>,
    /// Legal targets for a vote.
    pub candidates: Vec<String>,
    /// The other party, for a private conversation message.
    pub recipient: Option<String>,
    /// Pretty-printed response schema.
    pub schema: String,
    /// Statement length limit.
    pub max_statement_chars: usize,
}

#[derive(Serialize)]
struct CorrectionContext<'a> {
    problem: &'a str,
    schema: &'a str,
    candidates: &'a [String],
}

/// Manages prompt template loading and rendering.
#[derive(Debug)]
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    /// Create a prompt engine with the built-in templates.
    pub fn new() -> Result<Self, PromptError> {
        let mut env = Environment::new();
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)
                .map_err(|e| PromptError(format!("failed to add {name} template: {e}")))?;
        }
        Ok(Self { env })
    }

    /// Create a prompt engine, overriding built-in templates with any
    /// `<name>.j2` file found in `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, PromptError> {
        let mut engine = Self::new()?;
        for &(name, _) in TEMPLATES {
            let path = dir.join(format!("{name}.j2"));
            if !path.is_file() {
                continue;
            }
            let source = std::fs::read_to_string(&path)
                .map_err(|e| PromptError(format!("failed to read {}: {e}", path.display())))?;
            engine
                .env
                .add_template_owned(name, source)
                .map_err(|e| PromptError(format!("failed to add {name} template: {e}")))?;
        }
        Ok(engine)
    }

    fn render_named<S: Serialize>(&self, name: &str, ctx: &S) -> Result<String, PromptError> {
        self.env
            .get_template(name)
            .map_err(|e| PromptError(format!("missing {name} template: {e}")))?
            .render(ctx)
            .map_err(|e| PromptError(format!("{name} render failed: {e}")))
    }

    /// Render the full prompt for one decision.
    pub fn render(&self, kind: ActionKind, ctx: &PromptContext) -> Result<RenderedPrompt, PromptError> {
        let system = self.render_named("system", ctx)?;
        let context = self.render_named("context", ctx)?;
        let task = self.render_named(kind.as_str(), ctx)?;
        Ok(RenderedPrompt {
            system,
            user: format!("{context}\n\n{task}"),
        })
    }

    /// Render the corrective follow-up appended to a prompt on retry.
    pub fn render_correction(
        &self,
        problem: &str,
        schema: &str,
        candidates: &[String],
    ) -> Result<String, PromptError> {
        self.render_named(
            "correction",
            &CorrectionContext {
                problem,
                schema,
                candidates,
            },
        )
    }
}
