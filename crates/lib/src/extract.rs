//! Reply text extraction from a single thread message.
//!
//! The service has shipped several content shapes, so extraction is an ordered
//! list of extractors, each returning `Ok(Some(text))`, `Ok(None)` (nothing
//! here, try the next one) or `Err` (the shape was recognised but malformed).
//! With [`extract_text`] errors never escape a message: they are logged and the
//! next extractor runs. [`try_extract_text`] stops at the first error instead.

use crate::agents::ThreadMessage;
use serde_json::Value;

/// Strings found by the known-fields scan must be longer than this (in characters).
pub const MIN_SCANNED_TEXT_CHARS: usize = 10;

/// A message had a recognisable content block that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("content block {index} has a text field without a string value")]
    MissingTextValue { index: usize },
}

pub type ExtractFn = fn(&ThreadMessage) -> Result<Option<String>, ExtractError>;

/// A named extractor, tried in order.
#[derive(Clone, Copy)]
pub struct Extractor {
    pub name: &'static str,
    pub run: ExtractFn,
}

/// Extractors for messages of the latest turn.
pub const TURN_EXTRACTORS: &[Extractor] = &[
    Extractor {
        name: "text_segments",
        run: text_segments,
    },
    Extractor {
        name: "content",
        run: content_field,
    },
    Extractor {
        name: "known_fields",
        run: known_fields,
    },
];

/// Extractors for the loose fallback pass.
pub const FALLBACK_EXTRACTORS: &[Extractor] = &[
    Extractor {
        name: "text_segments",
        run: text_segments,
    },
    Extractor {
        name: "raw_content",
        run: raw_content,
    },
    Extractor {
        name: "raw_text",
        run: raw_text,
    },
];

/// Run `extractors` in order and return the first non-empty text.
pub fn extract_text(msg: &ThreadMessage, extractors: &[Extractor]) -> Option<String> {
    for extractor in extractors {
        match (extractor.run)(msg) {
            Ok(Some(text)) if !text.is_empty() => {
                log::debug!(
                    "extract: message {} via {}: {} chars",
                    msg.id,
                    extractor.name,
                    text.chars().count()
                );
                return Some(text);
            }
            Ok(_) => {}
            Err(e) => {
                log::debug!("extract: message {} {} failed: {}", msg.id, extractor.name, e);
            }
        }
    }
    None
}

/// Like [`extract_text`], but a malformed block ends extraction for the
/// message instead of moving on to the next extractor.
pub fn try_extract_text(
    msg: &ThreadMessage,
    extractors: &[Extractor],
) -> Result<Option<String>, ExtractError> {
    for extractor in extractors {
        if let Some(text) = (extractor.run)(msg)?.filter(|t| !t.is_empty()) {
            return Ok(Some(text));
        }
    }
    Ok(None)
}

/// String form of a JSON value: strings as-is, everything else as compact JSON.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// False for null, "", [] and {}.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// `block.text.value` of a content block that has a `text` field.
fn block_text_value(block: &Value, index: usize) -> Result<String, ExtractError> {
    block
        .get("text")
        .and_then(|t| t.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ExtractError::MissingTextValue { index })
}

/// Last content block of type "text".
pub fn text_segments(msg: &ThreadMessage) -> Result<Option<String>, ExtractError> {
    let Some(blocks) = msg.content.as_array() else {
        return Ok(None);
    };
    let last = blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| b.get("type").and_then(Value::as_str) == Some("text"))
        .last();
    match last {
        Some((index, block)) => block_text_value(block, index).map(Some),
        None => Ok(None),
    }
}

/// Generic content field: first block's text value (or its string form), or the content's string form.
pub fn content_field(msg: &ThreadMessage) -> Result<Option<String>, ExtractError> {
    if !is_present(&msg.content) {
        return Ok(None);
    }
    match &msg.content {
        Value::Array(blocks) => {
            let first = &blocks[0];
            if first.get("text").is_some() {
                block_text_value(first, 0).map(Some)
            } else {
                Ok(Some(display_string(first)))
            }
        }
        other => Ok(Some(display_string(other))),
    }
}

/// Last resort: first extra attribute named like "*text*" or "*content*" holding a long enough string.
pub fn known_fields(msg: &ThreadMessage) -> Result<Option<String>, ExtractError> {
    let found = msg.extra.iter().find_map(|(name, value)| {
        let name = name.to_lowercase();
        if !(name.contains("text") || name.contains("content")) {
            return None;
        }
        value
            .as_str()
            .filter(|s| s.chars().count() > MIN_SCANNED_TEXT_CHARS)
            .map(str::to_string)
    });
    Ok(found)
}

/// Raw string form of the content field.
pub fn raw_content(msg: &ThreadMessage) -> Result<Option<String>, ExtractError> {
    if !is_present(&msg.content) {
        return Ok(None);
    }
    Ok(Some(display_string(&msg.content)).filter(|s| !s.trim().is_empty()))
}

/// Raw string form of a plain `text` attribute.
pub fn raw_text(msg: &ThreadMessage) -> Result<Option<String>, ExtractError> {
    Ok(msg
        .extra
        .get("text")
        .filter(|v| is_present(v))
        .map(display_string)
        .filter(|s| !s.trim().is_empty()))
}
