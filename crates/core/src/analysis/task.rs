//! The contract every analysis task implements.

use serde_json::Value;

use super::config::Sampling;
use super::types::{AnalysisTaskKind, TaskPayload};

/// One independent kind of annotation.
///
/// A task owns its prompt construction, response validation and confidence
/// heuristic. It never talks to the provider itself; the task runner does.
pub trait AnalysisTask: Send + Sync {
    fn kind(&self) -> AnalysisTaskKind;

    /// Instructions sent as the system prompt.
    fn system_prompt(&self) -> &str;

    /// User prompt for already preprocessed text.
    fn build_prompt(&self, text: &str, language_hint: Option<&str>) -> String;

    fn sampling(&self) -> Sampling;

    /// Check the provider's JSON and turn it into a payload.
    ///
    /// The error string explains the first problem found.
    fn validate(&self, response: &Value) -> Result<TaskPayload, String>;

    /// Heuristic confidence for a validated payload, in [0, 1].
    fn confidence(&self, payload: &TaskPayload) -> f32;
}

/// Languages the prompts are tuned for.
pub(crate) const KNOWN_LANGUAGES: [&str; 3] = ["ar", "fr", "en"];

pub(crate) fn language_line(language_hint: Option<&str>) -> String {
    match language_hint {
        Some(lang) if !lang.trim().is_empty() => {
            format!("The text is most likely written in \"{}\".\n", lang.trim())
        }
        _ => String::new(),
    }
}

pub(crate) fn require_str<'a>(value: &'a Value, field: &str) -> Result<&'a str, String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing string field '{}'", field))
}

/// A number in [0, 1].
pub(crate) fn require_unit(value: &Value, field: &str) -> Result<f32, String> {
    let number = value
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("missing numeric field '{}'", field))?;
    if (0.0..=1.0).contains(&number) {
        Ok(number as f32)
    } else {
        Err(format!("'{}' must be within [0, 1], got {}", field, number))
    }
}

pub(crate) fn require_array<'a>(value: &'a Value, field: &str) -> Result<&'a Vec<Value>, String> {
    value
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("missing array field '{}'", field))
}

pub(crate) fn optional_string(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Strings of an optional array; non-string entries are ignored.
pub(crate) fn string_list(value: &Value, field: &str) -> Vec<String> {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn detected_language(value: &Value) -> Option<String> {
    optional_string(value, "language_detected").map(|l| l.to_ascii_lowercase())
}
