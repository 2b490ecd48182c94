//! Reading structured judgments out of free-form model text.
//!
//! One pass: strip code fences, cut out the first balanced JSON value (the
//! first object, for capabilities that answer with one), escape
//! raw control characters inside strings, deserialize. Whatever still fails
//! falls back to the capability's safe default (or a `MalformedOutput` error
//! where there is no safe default).

use crate::error::EngineError;
use crate::memory::{FactId, ReconciliationDecision};
use crate::planner::types::TaskState;
use crate::services::Route;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Error)]
#[error("unparseable {capability} output: {reason}")]
pub struct MalformedOutput {
    pub capability: &'static str,
    pub reason: String,
}

/// First balanced JSON object or array in `text`, with raw newlines and tabs
/// inside string literals escaped.
pub fn extract_json(text: &str) -> Option<String> {
    extract_from(text, |c| c == '{' || c == '[')
}

/// Like [`extract_json`], but starts at the first `{`. Bracketed chatter
/// ahead of the object (`Note [1]: {...}`) is skipped.
pub fn extract_object(text: &str) -> Option<String> {
    extract_from(text, |c| c == '{')
}

fn extract_from(text: &str, opens: fn(char) -> bool) -> Option<String> {
    let trimmed = strip_fences(text.trim());
    let start = trimmed.find(opens)?;

    let mut out = String::with_capacity(trimmed.len() - start);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in trimmed[start..].chars() {
        if in_string {
            match c {
                _ if escaped => {
                    escaped = false;
                    out.push(c);
                }
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
            continue;
        }

        out.push(c);
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(out);
                }
            }
            _ => {}
        }
    }

    None
}

fn strip_fences(text: &str) -> &str {
    let mut body = text;
    if let Some(rest) = body.strip_prefix("```") {
        body = rest.strip_prefix("json").unwrap_or(rest);
    }
    body.strip_suffix("```").unwrap_or(body).trim()
}

pub fn json_value(capability: &'static str, text: &str) -> Result<Value, MalformedOutput> {
    decode(capability, extract_json(text), "no JSON value found")
}

/// For capabilities whose answer is always an object.
pub fn object_value(capability: &'static str, text: &str) -> Result<Value, MalformedOutput> {
    decode(capability, extract_object(text), "no JSON object found")
}

fn decode(capability: &'static str, json: Option<String>, missing: &str) -> Result<Value, MalformedOutput> {
    let json = json.ok_or_else(|| MalformedOutput {
        capability,
        reason: missing.to_string(),
    })?;
    serde_json::from_str(&json).map_err(|e| MalformedOutput {
        capability,
        reason: e.to_string(),
    })
}

/// Deserialize an object-shaped answer.
pub fn parse_json<T: DeserializeOwned>(capability: &'static str, text: &str) -> Result<T, MalformedOutput> {
    let value = object_value(capability, text)?;
    serde_json::from_value(value).map_err(|e| MalformedOutput {
        capability,
        reason: e.to_string(),
    })
}

/// Classifier output. Accepts `{needs_reconciliation, direct_answer}` as well
/// as the `{action: plan|respond, sim_update: y|n}` form. Each field that is
/// missing or out of range takes its safe default independently.
pub fn route(text: &str) -> Route {
    let default = Route::default();
    let value = match object_value("classifier", text) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!("Classifier returned a non-object, using default route");
            return default;
        }
        Err(e) => {
            warn!("{}, using default route", e);
            return default;
        }
    };

    let direct_answer = match (value.get("direct_answer"), value.get("action")) {
        (Some(Value::Bool(b)), _) => *b,
        (_, Some(Value::String(a))) if a == "respond" => true,
        (_, Some(Value::String(a))) if a == "plan" => false,
        (_, other) => {
            warn!("Invalid route action {:?}, defaulting to direct answer", other);
            default.direct_answer
        }
    };

    let needs_reconciliation = match (value.get("needs_reconciliation"), value.get("sim_update")) {
        (Some(Value::Bool(b)), _) => *b,
        (_, Some(Value::String(s))) if s == "y" => true,
        (_, Some(Value::String(s))) if s == "n" => false,
        (_, other) => {
            warn!("Invalid reconciliation flag {:?}, defaulting to no update", other);
            default.needs_reconciliation
        }
    };

    Route {
        needs_reconciliation,
        direct_answer,
    }
}

/// Reconciler output; anything unreadable is a no-op.
pub fn decision(text: &str) -> ReconciliationDecision {
    match parse_json("reconciler", text) {
        Ok(decision) => decision,
        Err(e) => {
            warn!("{}, defaulting to no-op", EngineError::MalformedDecision(e.reason));
            ReconciliationDecision::NoOp
        }
    }
}

/// Category ranker output: a bare array of names or `{relevant_categories: [...]}`.
pub fn categories(text: &str) -> Vec<String> {
    let list = match json_value("category ranker", text) {
        Ok(Value::Array(items)) => items,
        Ok(Value::Object(mut map)) => match map.remove("relevant_categories") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        Ok(_) => Vec::new(),
        Err(e) => {
            warn!("{}, no categories selected", e);
            Vec::new()
        }
    };

    list.into_iter()
        .filter_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .collect()
}

/// Fact ranker output: `[{fact_id, score}]`, `[[id, score]]` or
/// `{ranking: [...]}`. Entries without an id are dropped.
pub fn fact_ranking(text: &str) -> Vec<(FactId, f32)> {
    let list = match json_value("fact ranker", text) {
        Ok(Value::Array(items)) => items,
        Ok(Value::Object(mut map)) => match map.remove("ranking") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        Ok(_) => Vec::new(),
        Err(e) => {
            warn!("{}, empty ranking", e);
            Vec::new()
        }
    };

    list.into_iter()
        .filter_map(|entry| match entry {
            Value::Object(map) => {
                let id = map.get("fact_id").or_else(|| map.get("id"))?.as_str()?.to_string();
                let score = map
                    .get("score")
                    .or_else(|| map.get("similarity_score"))
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                Some((id, score as f32))
            }
            Value::Array(pair) => {
                let id = pair.first()?.as_str()?.to_string();
                let score = pair.get(1).and_then(Value::as_f64).unwrap_or(0.0);
                Some((id, score as f32))
            }
            Value::String(id) => Some((id, 0.0)),
            _ => None,
        })
        .collect()
}

pub fn task_state(text: &str) -> Result<TaskState, MalformedOutput> {
    parse_json("planner", text)
}
