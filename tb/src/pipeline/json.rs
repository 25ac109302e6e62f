//! Extraction of JSON payloads from model text
//!
//! Models wrap JSON in code fences, lead with prose, and leave trailing commas.
//! Everything here strips those artifacts before handing the text to serde.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::step::RawStep;
use crate::llm::LlmError;

fn trailing_comma_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",(\s*[\]}])").ok()).as_ref()
}

/// Strip code fences, leading/trailing prose, and trailing commas
pub fn clean(text: &str) -> String {
    let mut body = text.trim();

    if let Some(start) = body.find("```") {
        let after = &body[start + 3..];
        // Skip the language tag line (```json, ```JSON, bare ```)
        let after = after.find('\n').map(|nl| &after[nl + 1..]).unwrap_or("");
        body = match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        };
    }

    let open = body.find(['[', '{']);
    let close = body.rfind([']', '}']);
    if let (Some(open), Some(close)) = (open, close)
        && close >= open
    {
        body = &body[open..=close];
    }

    match trailing_comma_re() {
        Some(re) => re.replace_all(body.trim(), "$1").into_owned(),
        None => body.trim().to_string(),
    }
}

/// Clean then deserialize into any type
pub fn parse<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let cleaned = clean(text);
    debug!(len = cleaned.len(), "parse: called");
    if cleaned.is_empty() {
        return Err(LlmError::InvalidResponse("empty response".to_string()));
    }
    Ok(serde_json::from_str(&cleaned)?)
}

/// Parse a step list given either as a bare array or wrapped in `steps`/`subtasks`
pub fn parse_steps(text: &str) -> Result<Vec<RawStep>, LlmError> {
    let value: serde_json::Value = parse(text)?;
    steps_from_value(value)
}

/// Pull the step array out of an already parsed value
pub fn steps_from_value(value: serde_json::Value) -> Result<Vec<RawStep>, LlmError> {
    let array = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut map) => {
            let wrapped = ["steps", "subtasks", "correctedSteps", "corrected_steps"]
                .iter()
                .find_map(|key| map.remove(*key));
            match wrapped {
                Some(inner @ serde_json::Value::Array(_)) => inner,
                _ => {
                    debug!("steps_from_value: object without a step array");
                    return Err(LlmError::InvalidResponse("expected a steps array".to_string()));
                }
            }
        }
        _ => return Err(LlmError::InvalidResponse("expected a JSON array or object".to_string())),
    };
    Ok(serde_json::from_value(array)?)
}
