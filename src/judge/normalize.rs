// src/judge/normalize.rs — Normalize free-form judge output into a canonical
// score record

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::infra::errors::PipelineError;

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Extract a JSON object from free-form model text.
///
/// Priority order: a fenced code block containing `{...}`, then the span
/// from the first `{` to the last `}`, then the raw text verbatim. If
/// parsing fails, retries once after collapsing whitespace runs to single
/// spaces (repairs some quoting/newline artifacts). Still unparseable text
/// is a `Parse` failure; the caller decides whether that means "skip this
/// item" or "treat as a scored failure".
pub fn extract_json(raw_text: &str) -> Result<Value, PipelineError> {
    let trimmed = raw_text.trim();

    let candidate = if let Some(caps) = fenced_block_re().captures(trimmed) {
        caps.get(1).map(|m| m.as_str()).unwrap_or(trimmed)
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            &trimmed[start..=end]
        } else {
            trimmed
        }
    } else {
        trimmed
    };

    if let Ok(value) = serde_json::from_str(candidate) {
        return Ok(value);
    }

    let collapsed = whitespace_re().replace_all(candidate, " ");
    serde_json::from_str(&collapsed).map_err(|e| {
        PipelineError::Parse(format!(
            "JSON parse error: {}",
            e.to_string().chars().take(100).collect::<String>()
        ))
    })
}

/// One dimension's score as the model reported it: either a bare number or
/// a nested `{score, rationale}` object. Resolved per entry, never as a
/// global schema flag, because models mix shapes within one reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreEntry {
    Number(f64),
    Nested {
        score: f64,
        rationale: Option<String>,
    },
}

impl ScoreEntry {
    /// Non-numeric, non-object values normalize to score 0.
    pub fn from_value(value: &Value) -> Self {
        if let Some(n) = value.as_f64() {
            return ScoreEntry::Number(n);
        }
        if let Some(obj) = value.as_object() {
            return ScoreEntry::Nested {
                score: obj.get("score").and_then(Value::as_f64).unwrap_or(0.0),
                rationale: obj
                    .get("rationale")
                    .and_then(Value::as_str)
                    .map(String::from),
            };
        }
        ScoreEntry::Number(0.0)
    }

    pub fn score(&self) -> f64 {
        match self {
            ScoreEntry::Number(n) => *n,
            ScoreEntry::Nested { score, .. } => *score,
        }
    }
}

/// Coerce heterogeneous score shapes into `(scores, rationales)`. The
/// rationales map is always present in the final record, possibly empty.
pub fn normalize_scores(
    raw_scores: &Value,
) -> (BTreeMap<String, f64>, BTreeMap<String, String>) {
    let mut scores = BTreeMap::new();
    let mut rationales = BTreeMap::new();

    let Some(obj) = raw_scores.as_object() else {
        return (scores, rationales);
    };

    for (dim, value) in obj {
        match ScoreEntry::from_value(value) {
            ScoreEntry::Number(n) => {
                scores.insert(dim.clone(), n);
            }
            ScoreEntry::Nested { score, rationale } => {
                scores.insert(dim.clone(), score);
                if let Some(r) = rationale {
                    rationales.insert(dim.clone(), r);
                }
            }
        }
    }

    (scores, rationales)
}
