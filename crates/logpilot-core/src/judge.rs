//! Strict parsing of structured judge responses.
//!
//! Models wrap JSON in markdown fences, prepend prose, or quote booleans.
//! [`extract_json_object`] finds the first balanced `{...}` block (ignoring
//! braces inside string literals) and [`parse_verdict`] turns it into a typed
//! [`JudgeVerdict`]. Anything else is an error the calling node maps to its
//! own fallback policy.

use serde_json::Value;
use thiserror::Error;

/// A judge's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeVerdict {
    pub valid: bool,
    pub feedback: String,
}

/// Why a judge response could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JudgeParseError {
    #[error("no JSON object in judge response")]
    NoObject,

    #[error("malformed judge JSON: {0}")]
    Malformed(String),

    /// `valid` missing or not a boolean.
    #[error("judge response has no boolean 'valid' field")]
    MissingValid,
}

/// Return the first balanced JSON object in `text`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a `{valid, feedback}` judge response.
pub fn parse_verdict(text: &str) -> Result<JudgeVerdict, JudgeParseError> {
    let object = extract_json_object(text).ok_or(JudgeParseError::NoObject)?;
    let value: Value =
        serde_json::from_str(object).map_err(|e| JudgeParseError::Malformed(e.to_string()))?;

    let valid = match value.get("valid") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => true,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => false,
        _ => return Err(JudgeParseError::MissingValid),
    };
    let feedback = match value.get("feedback") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    Ok(JudgeVerdict { valid, feedback })
}
