//! Model response parsing into validated action payloads.
//!
//! A model returns raw text, ideally a JSON object. This module recovers
//! the object through several strategies, reads the decision field under
//! any of the names models commonly use, and validates it against the
//! decision's rules. Anything that does not survive becomes a
//! [`ResponseError`], which the decision protocol treats as a failed
//! attempt.

use serde::Deserialize;
use traitors_types::{ActionKind, ActionPayload, ParticipantId};

use crate::error::{InvalidTargetError, TargetProblem};

/// Why a response could not be turned into an action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    /// No JSON object could be recovered from the text.
    #[error("response is not a JSON object")]
    NotJson,

    /// The object does not have the expected shape.
    #[error("malformed response: {reason}")]
    Malformed {
        /// Deserialization error.
        reason: String,
    },

    /// The object lacks the required field.
    #[error("response is missing the {field:?} field")]
    MissingField {
        /// The expected field name.
        field: &'static str,
    },

    /// The statement was empty after trimming.
    #[error("statement is empty")]
    EmptyStatement,

    /// The named target is not a legal choice.
    #[error(transparent)]
    InvalidTarget(#[from] InvalidTargetError),
}

/// The rules a response is validated against.
#[derive(Debug, Clone, Copy)]
pub struct ResponseRules<'a> {
    /// Decision kind.
    pub kind: ActionKind,
    /// Legal targets (votes only).
    pub candidates: &'a [ParticipantId],
    /// Every participant with their alive flag, for precise rejections.
    pub roster: &'a [(ParticipantId, bool)],
    /// Statements longer than this are truncated.
    pub max_statement_chars: usize,
}

#[derive(Debug, Deserialize)]
struct RawVote {
    #[serde(
        default,
        alias = "target_name",
        alias = "eliminate_player",
        alias = "final_vote",
        alias = "vote",
        alias = "player"
    )]
    target: Option<String>,
    #[serde(default, alias = "reason", alias = "explanation")]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStatement {
    #[serde(
        default,
        alias = "message",
        alias = "speech",
        alias = "message_to_send",
        alias = "text"
    )]
    statement: Option<String>,
}

/// Parse and validate a model response.
pub fn parse_response(raw: &str, rules: &ResponseRules<'_>) -> Result<ActionPayload, ResponseError> {
    let value = extract_object(raw).ok_or(ResponseError::NotJson)?;

    if rules.kind.is_vote() {
        let vote: RawVote = serde_json::from_value(value).map_err(malformed)?;
        let named = vote
            .target
            .filter(|t| !t.trim().is_empty())
            .ok_or(ResponseError::MissingField { field: "target" })?;
        let target = resolve_target(&named, rules)?;
        Ok(ActionPayload::Target {
            target,
            reasoning: vote.reasoning.filter(|r| !r.trim().is_empty()),
        })
    } else {
        let statement: RawStatement = serde_json::from_value(value).map_err(malformed)?;
        let text = statement
            .statement
            .ok_or(ResponseError::MissingField { field: "statement" })?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ResponseError::EmptyStatement);
        }
        Ok(ActionPayload::Statement {
            text: truncate_chars(text, rules.max_statement_chars),
        })
    }
}

fn malformed(error: serde_json::Error) -> ResponseError {
    ResponseError::Malformed {
        reason: error.to_string(),
    }
}

/// The JSON schema a response for `kind` must satisfy.
pub fn response_schema(kind: ActionKind, candidates: &[ParticipantId], max_statement_chars: usize) -> serde_json::Value {
    if kind.is_vote() {
        let names: Vec<&str> = candidates.iter().map(ParticipantId::as_str).collect();
        serde_json::json!({
            "type": "object",
            "properties": {
                "reasoning": { "type": "string" },
                "target": { "type": "string", "enum": names }
            },
            "required": ["target"]
        })
    } else {
        serde_json::json!({
            "type": "object",
            "properties": {
                "statement": { "type": "string", "minLength": 1, "maxLength": max_statement_chars }
            },
            "required": ["statement"]
        })
    }
}

/// Match a named target against the candidates: exactly first, then
/// ignoring case and surrounding whitespace.
fn resolve_target(named: &str, rules: &ResponseRules<'_>) -> Result<ParticipantId, InvalidTargetError> {
    let wanted = named.trim();
    let matches = |id: &ParticipantId| id.as_str().eq_ignore_ascii_case(wanted);

    if let Some(exact) = rules.candidates.iter().find(|c| c.as_str() == wanted) {
        return Ok(exact.clone());
    }
    if let Some(loose) = rules.candidates.iter().find(|c| matches(c)) {
        return Ok(loose.clone());
    }

    let problem = match rules.roster.iter().find(|(id, _)| matches(id)) {
        None => TargetProblem::Unknown,
        Some((_, false)) => TargetProblem::AlreadyEliminated,
        Some((_, true)) => TargetProblem::NotACandidate,
    };
    Err(InvalidTargetError {
        target: wanted.to_owned(),
        problem,
    })
}

/// Recover a JSON object from model text.
///
/// Strategies, in order:
/// 1. the whole text
/// 2. the contents of a markdown code block
/// 3. the outermost `{ ... }` span
///
/// each tried as-is and then with trailing commas removed.
fn extract_object(raw: &str) -> Option<serde_json::Value> {
    let trimmed = raw.trim();
    let candidates = [
        Some(trimmed),
        extract_codeblock(trimmed),
        outermost_braces(trimmed),
    ];
    candidates.into_iter().flatten().find_map(|text| {
        parse_object(text).or_else(|| parse_object(&strip_trailing_commas(text)))
    })
}

fn parse_object(text: &str) -> Option<serde_json::Value> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .filter(serde_json::Value::is_object)
}

/// Contents of the first markdown code block (```json or bare ```).
fn extract_codeblock(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = text.get(open.checked_add(3)?..)?;
    let body_start = after_fence.find('\n').and_then(|nl| nl.checked_add(1))?;
    let body = after_fence.get(body_start..)?;
    let close = body.find("```")?;
    body.get(..close).map(str::trim)
}

fn outermost_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    text.get(start..=end)
}

/// Remove commas that directly precede a closing brace or bracket.
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (index, c) in text.char_indices() {
        if c == ',' {
            let rest = text.get(index.saturating_add(1)..).unwrap_or_default();
            if matches!(rest.trim_start().chars().next(), Some('}' | ']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Truncate to at most `max` characters without splitting a character.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text.get(..cut).unwrap_or(text).to_owned(),
        None => text.to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<ParticipantId> {
        names.iter().copied().map(ParticipantId::new).collect()
    }

    fn vote_rules<'a>(candidates: &'a [ParticipantId], roster: &'a [(ParticipantId, bool)]) -> ResponseRules<'a> {
        ResponseRules {
            kind: ActionKind::BanishmentVote,
            candidates,
            roster,
            max_statement_chars: 100,
        }
    }

    fn roster() -> Vec<(ParticipantId, bool)> {
        vec![
            (ParticipantId::new("Alice"), true),
            (ParticipantId::new("Bob"), true),
            (ParticipantId::new("Carol"), false),
        ]
    }

    #[test]
    fn parses_clean_vote() {
        let candidates = ids(&["Bob"]);
        let roster = roster();
        let payload = parse_response(
            r#"{"reasoning": "quiet", "target": "Bob"}"#,
            &vote_rules(&candidates, &roster),
        )
        .unwrap();
        assert_eq!(payload.target(), Some(&ParticipantId::new("Bob")));
    }

    #[test]
    fn accepts_field_aliases_and_case() {
        let candidates = ids(&["Bob"]);
        let roster = roster();
        let rules = vote_rules(&candidates, &roster);
        for raw in [
            r#"{"target_name": "bob"}"#,
            r#"{"eliminate_player": "Bob"}"#,
            r#"{"final_vote": " Bob "}"#,
        ] {
            let payload = parse_response(raw, &rules).unwrap();
            assert_eq!(payload.target(), Some(&ParticipantId::new("Bob")), "{raw}");
        }
    }

    #[test]
    fn recovers_codeblock_and_trailing_comma() {
        let candidates = ids(&["Bob"]);
        let roster = roster();
        let raw = "Here you go:\n```json\n{\"target\": \"Bob\",}\n```";
        let payload = parse_response(raw, &vote_rules(&candidates, &roster)).unwrap();
        assert_eq!(payload.target(), Some(&ParticipantId::new("Bob")));
    }

    #[test]
    fn recovers_object_surrounded_by_prose() {
        let candidates = ids(&["Bob"]);
        let roster = roster();
        let raw = "I think {\"target\": \"Bob\"} is right.";
        assert!(parse_response(raw, &vote_rules(&candidates, &roster)).is_ok());
    }

    #[test]
    fn rejects_dead_unknown_and_ineligible_targets() {
        let candidates = ids(&["Bob"]);
        let roster = roster();
        let rules = vote_rules(&candidates, &roster);

        let problem = |raw: &str| match parse_response(raw, &rules) {
            Err(ResponseError::InvalidTarget(e)) => Some(e.problem),
            _ => None,
        };
        assert_eq!(problem(r#"{"target": "Carol"}"#), Some(TargetProblem::AlreadyEliminated));
        assert_eq!(problem(r#"{"target": "Zed"}"#), Some(TargetProblem::Unknown));
        assert_eq!(problem(r#"{"target": "Alice"}"#), Some(TargetProblem::NotACandidate));
    }

    #[test]
    fn rejects_non_json_and_missing_field() {
        let candidates = ids(&["Bob"]);
        let roster = roster();
        let rules = vote_rules(&candidates, &roster);
        assert_eq!(parse_response("Bob!", &rules), Err(ResponseError::NotJson));
        assert_eq!(
            parse_response(r#"{"reasoning": "hmm"}"#, &rules),
            Err(ResponseError::MissingField { field: "target" })
        );
    }

    #[test]
    fn statements_are_trimmed_truncated_and_non_empty() {
        let rules = ResponseRules {
            kind: ActionKind::DiscussionStatement,
            candidates: &[],
            roster: &[],
            max_statement_chars: 5,
        };
        assert_eq!(
            parse_response(r#"{"speech": "  héllo world "}"#, &rules),
            Ok(ActionPayload::Statement {
                text: "héllo".to_owned()
            })
        );
        assert_eq!(
            parse_response(r#"{"statement": "   "}"#, &rules),
            Err(ResponseError::EmptyStatement)
        );
    }

    #[test]
    fn vote_schema_enumerates_candidates() {
        let schema = response_schema(ActionKind::MurderVote, &ids(&["A", "B"]), 10);
        let names = schema
            .pointer("/properties/target/enum")
            .and_then(serde_json::Value::as_array)
            .map(Vec::len);
        assert_eq!(names, Some(2));
    }

    #[test]
    fn strip_trailing_commas_basic() {
        assert_eq!(strip_trailing_commas(r#"{"a": 1, "b": [1, 2 ,] ,}"#), r#"{"a": 1, "b": [1, 2 ] }"#);
    }
}
