//! Turns a raw model reply into a `GenAIResponse`.
//!
//! The repair pass handles fences, line comments, prose
//! around the outermost object, `undefined` values and trailing commas. It
//! does not balance braces or quote keys. Anything still unparsable becomes
//! the fixed fallback response; this module never fails.

use std::sync::OnceLock;

use easygraph_contracts::chart::GenAIResponse;
use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizeOutcome {
    Parsed,
    Fallback { reason: String, cleaned: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub response: GenAIResponse,
    pub outcome: NormalizeOutcome,
}

impl Normalized {
    pub fn is_fallback(&self) -> bool {
        matches!(self.outcome, NormalizeOutcome::Fallback { .. })
    }
}

const FENCE_PATTERN: &str = r"```[A-Za-z0-9_-]*";
const LINE_COMMENT_PATTERN: &str = r"//[^\r\n]*";
const UNDEFINED_VALUE_PATTERN: &str = r":\s*undefined";
const TRAILING_COMMA_OBJECT_PATTERN: &str = r",\s*\}";
const TRAILING_COMMA_ARRAY_PATTERN: &str = r",\s*\]";

static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
static LINE_COMMENT: OnceLock<Option<Regex>> = OnceLock::new();
static UNDEFINED_VALUE: OnceLock<Option<Regex>> = OnceLock::new();
static TRAILING_COMMA_OBJECT: OnceLock<Option<Regex>> = OnceLock::new();
static TRAILING_COMMA_ARRAY: OnceLock<Option<Regex>> = OnceLock::new();

fn replace_all(
    slot: &'static OnceLock<Option<Regex>>,
    pattern: &str,
    text: &str,
    replacement: &str,
) -> String {
    match slot.get_or_init(|| Regex::new(pattern).ok()) {
        Some(re) => re.replace_all(text, replacement).into_owned(),
        None => text.to_string(),
    }
}

/// Applies the repair steps in order and returns the text handed to the parser.
/// Empty or blank input cleans to an empty string, which then falls back.
pub fn clean_json_output(text: &str) -> String {
    let mut cleaned = replace_all(&FENCE, FENCE_PATTERN, text, "");
    cleaned = replace_all(&LINE_COMMENT, LINE_COMMENT_PATTERN, &cleaned, "");

    if let (Some(first_open), Some(last_close)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if last_close > first_open {
            cleaned = cleaned[first_open..=last_close].to_string();
        }
    }

    cleaned = replace_all(&UNDEFINED_VALUE, UNDEFINED_VALUE_PATTERN, &cleaned, ": null");
    cleaned = replace_all(
        &TRAILING_COMMA_OBJECT,
        TRAILING_COMMA_OBJECT_PATTERN,
        &cleaned,
        "}",
    );
    cleaned = replace_all(&TRAILING_COMMA_ARRAY, TRAILING_COMMA_ARRAY_PATTERN, &cleaned, "]");
    cleaned.trim().to_string()
}

pub fn normalize_response(raw: &str, prompt: &str) -> Normalized {
    let cleaned = clean_json_output(raw);
    let parsed = match serde_json::from_str::<Value>(&cleaned) {
        Ok(value) => value,
        Err(err) => return fallback(prompt, err.to_string(), cleaned),
    };
    match GenAIResponse::from_value(&parsed, prompt) {
        Some(response) => Normalized {
            response,
            outcome: NormalizeOutcome::Parsed,
        },
        None => fallback(
            prompt,
            format!("expected a JSON object, got {}", value_kind(&parsed)),
            cleaned,
        ),
    }
}

fn fallback(prompt: &str, reason: String, cleaned: String) -> Normalized {
    Normalized {
        response: GenAIResponse::fallback(prompt),
        outcome: NormalizeOutcome::Fallback { reason, cleaned },
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
