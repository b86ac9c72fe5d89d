//! Recover a JSON object from a model reply.
//!
//! Models wrap structured output in markdown fences, prepend a sentence of
//! preamble, or trail off with commentary. The extractor walks a fixed
//! sequence of stages and stops at the first one that yields valid JSON:
//!
//! 1. `Fenced`    : the body of the first ```` ``` ```` block, if any
//! 2. `BraceSpan` : the outermost `{ … }` span of the text
//! 3. `Raw`       : the trimmed text as-is
//!
//! Failure is a value, never a panic: callers branch on [`ExtractError`].

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("empty response")]
    Empty,
    #[error("no JSON object found in response")]
    NoObject,
    #[error("malformed JSON in response: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Fenced,
    BraceSpan,
    Raw,
    Done,
}

impl Stage {
    fn next(self) -> Stage {
        match self {
            Stage::Fenced => Stage::BraceSpan,
            Stage::BraceSpan => Stage::Raw,
            Stage::Raw | Stage::Done => Stage::Done,
        }
    }
}

/// Parse the first JSON object recoverable from `text`.
pub fn extract_json(text: &str) -> Result<Value, ExtractError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ExtractError::Empty);
    }

    // Narrowing: once a fenced body is found, later stages look only inside it.
    let mut scope = text;
    let mut last_parse_error = None;
    let mut stage = Stage::Fenced;

    while stage != Stage::Done {
        let candidate = match stage {
            Stage::Fenced => {
                let body = fenced_body(scope);
                if let Some(body) = body {
                    scope = body;
                }
                body
            }
            Stage::BraceSpan => outermost_braces(scope),
            Stage::Raw => Some(scope),
            Stage::Done => None,
        };

        if let Some(candidate) = candidate {
            match serde_json::from_str::<Value>(candidate) {
                Ok(value @ Value::Object(_)) => return Ok(value),
                Ok(_) => {}
                Err(e) => last_parse_error = Some(e),
            }
        }
        stage = stage.next();
    }

    match last_parse_error {
        Some(source) if outermost_braces(scope).is_some() => Err(ExtractError::Malformed { source }),
        _ => Err(ExtractError::NoObject),
    }
}

/// Body of the first fenced code block, with an optional language tag dropped.
fn fenced_body(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    // Skip the info string ("json", "JSON", …) up to the end of the line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    let close = body.find("```").unwrap_or(body.len());
    Some(body[..close].trim())
}

fn outermost_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
