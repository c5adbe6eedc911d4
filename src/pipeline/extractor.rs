//! Recover a JSON object from free-form analyzer output.
//!
//! Analyzer responses arrive wrapped in prose, code fences, `//` comments and
//! the occasional trailing comma. The extractor cleans those up, tries a direct
//! parse, and falls back to the span between the first `{` and the last `}`.

use std::iter::Peekable;
use std::str::Chars;

use serde_json::{Map, Value};
use thiserror::Error;

/// A structured analyzer payload: always a JSON object at the top level.
pub type Payload = Map<String, Value>;

/// The response could not be turned into a payload. The raw text is kept
/// for diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed analyzer response: {reason}")]
pub struct MalformedResponse {
    pub reason: String,
    pub raw: String,
}

impl MalformedResponse {
    fn new(reason: impl Into<String>, raw: &str) -> Self {
        Self {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }
}

/// Extract a payload from raw analyzer text.
pub fn extract_payload(raw: &str) -> Result<Payload, MalformedResponse> {
    let cleaned = clean_response(raw);

    // Direct parse first: most responses are just fenced JSON.
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(cleaned.trim()) {
        return Ok(map);
    }

    let (start, end) = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            return Err(MalformedResponse::new(
                "No JSON object found in analyzer response",
                raw,
            ))
        }
    };

    match serde_json::from_str::<Value>(&cleaned[start..=end]) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(MalformedResponse::new("Payload is not a JSON object", raw)),
        Err(e) => Err(MalformedResponse::new(e.to_string(), raw)),
    }
}

/// Strip fences, stray backticks and line comments, then repair trailing
/// commas. Text inside JSON string literals is never rewritten.
pub fn clean_response(raw: &str) -> String {
    let stripped = rewrite_outside_strings(raw.trim(), |c, rest, out| match c {
        '`' => {
            // A fence is a backtick run plus an optional language tag.
            if rest.peek() == Some(&'`') {
                while rest.next_if_eq(&'`').is_some() {}
                while rest
                    .next_if(|n| n.is_ascii_alphanumeric() || *n == '_' || *n == '-')
                    .is_some()
                {}
            }
        }
        '/' if rest.peek() == Some(&'/') => {
            // Skip to end of line, keep the newline itself.
            for skipped in rest.by_ref() {
                if skipped == '\n' {
                    out.push('\n');
                    break;
                }
            }
        }
        _ => out.push(c),
    });

    rewrite_outside_strings(stripped.trim(), |c, rest, out| {
        let trailing = c == ','
            && matches!(rest.clone().find(|n| !n.is_whitespace()), Some('}' | ']'));
        if !trailing {
            out.push(c);
        }
    })
}

/// Copy `text`, handing every character outside a JSON string literal to
/// `outside`, which decides what to emit and may consume lookahead.
///
/// JSON strings cannot hold a raw newline, so a newline always ends one. An
/// unbalanced quote in surrounding prose therefore stays on its own line.
fn rewrite_outside_strings(
    text: &str,
    mut outside: impl FnMut(char, &mut Peekable<Chars<'_>>, &mut String),
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if c == '\n' {
                in_string = false;
                escaped = false;
            } else if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            in_string = true;
            out.push(c);
        } else {
            outside(c, &mut chars, &mut out);
        }
    }

    out
}
