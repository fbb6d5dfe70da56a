// src/grading/text.rs

use std::{collections::BTreeSet, sync::LazyLock};

use regex::Regex;
use serde_json::Value;

/// Words, optionally joined by hyphens or apostrophes ("high-level", "don't").
static WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{N}]+(?:['\-][\p{L}\p{N}]+)*").expect("word pattern is valid")
});

/// Trims and, unless `case_sensitive`, lowercases.
pub fn normalize(s: &str, case_sensitive: bool) -> String {
    let trimmed = s.trim();
    if case_sensitive {
        trimmed.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

/// Textual form of a scalar JSON value. Arrays, objects and null have none.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Normalized scalar text; non-scalars compare as the empty string.
pub fn normalized_scalar(value: &Value, case_sensitive: bool) -> String {
    scalar_text(value)
        .map(|s| normalize(&s, case_sensitive))
        .unwrap_or_default()
}

/// Accepts JSON booleans and the strings "true"/"false".
pub fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Distinct word tokens of `text`.
pub fn tokenize(text: &str, case_sensitive: bool) -> BTreeSet<String> {
    WORD.find_iter(text)
        .map(|m| {
            if case_sensitive {
                m.as_str().to_string()
            } else {
                m.as_str().to_lowercase()
            }
        })
        .collect()
}

/// Nearest integer, ties rounding up. Inputs are non-negative scores.
pub fn round_half_up(x: f64) -> f64 {
    x.round()
}

/// Picks the first of `keys` present in an object response, otherwise the
/// response itself (clients may send a bare value).
pub fn response_field<'v>(response: &'v Value, keys: &[&str]) -> &'v Value {
    if let Value::Object(map) = response {
        for key in keys {
            if let Some(v) = map.get(*key) {
                return v;
            }
        }
    }
    response
}
