//! Wire codec for result submissions.
//!
//! A submission body is a JSON array of single-key objects, keyed by the
//! hyphenated task identifier:
//!
//! ```text
//! [{"6f1c2a3b-0000-4000-8000-000000000001": {"contents": "ok", "success": "true"}}]
//! ```
//!
//! This is the shape the listening post's `/results` handler walks. JSON
//! string escaping delimits the fields, so arbitrary contents are safe.
//! Contents that are not valid UTF-8 are written as base64 with an
//! `"encoding": "base64"` member next to them.
//!
//! # Examples
//!
//! ```
//! use result_courier::codec;
//! use result_courier::{TaskId, TaskResult};
//!
//! let result = TaskResult::new(TaskId::new_v4(), vec![0xff, 0x00, 0xfe], false);
//! let body = codec::encode(&result);
//! assert_eq!(codec::decode(&body).unwrap(), result);
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::constants::{BASE64_ENCODING, MAX_CONTENTS_LEN};
use crate::error::DecodeError;
use crate::types::{TaskId, TaskResult};

/// Content type of an encoded submission.
pub const CONTENT_TYPE: &str = "application/json";

/// Inner object of one wire entry.
#[derive(Debug, Deserialize)]
struct WireEntry {
    contents: String,
    #[serde(default)]
    encoding: Option<String>,
    success: Value,
}

/// Encodes one result as a submission body.
pub fn encode(result: &TaskResult) -> Bytes {
    encode_batch(std::slice::from_ref(result))
}

/// Encodes several results into one submission body.
///
/// The listening post accepts any number of entries per request; entries
/// keep the order of `results`.
pub fn encode_batch(results: &[TaskResult]) -> Bytes {
    let entries: Vec<Value> = results.iter().map(entry_to_value).collect();
    Bytes::from(Value::Array(entries).to_string())
}

fn entry_to_value(result: &TaskResult) -> Value {
    let mut inner = Map::new();
    match std::str::from_utf8(result.contents()) {
        Ok(text) => {
            inner.insert("contents".to_string(), Value::String(text.to_string()));
        }
        Err(_) => {
            inner.insert(
                "contents".to_string(),
                Value::String(STANDARD.encode(result.contents())),
            );
            inner.insert("encoding".to_string(), json!(BASE64_ENCODING));
        }
    }
    // The listening post stores the flag as text.
    inner.insert(
        "success".to_string(),
        json!(if result.success() { "true" } else { "false" }),
    );

    let mut entry = Map::new();
    entry.insert(result.id().to_string(), Value::Object(inner));
    Value::Object(entry)
}

/// Decodes a submission body holding exactly one result.
pub fn decode(bytes: &[u8]) -> Result<TaskResult, DecodeError> {
    let mut results = decode_batch(bytes)?;
    if results.len() != 1 {
        return Err(DecodeError::BatchSize(results.len()));
    }
    Ok(results.remove(0))
}

/// Decodes a submission body holding any number of results.
///
/// A bare entry object (without the surrounding array) is accepted as a
/// batch of one.
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<TaskResult>, DecodeError> {
    let document: Value = serde_json::from_slice(bytes)?;
    match document {
        Value::Array(items) => items.into_iter().map(decode_entry).collect(),
        Value::Object(_) => Ok(vec![decode_entry(document)?]),
        other => Err(DecodeError::UnexpectedShape(format!(
            "expected an array of results, found {}",
            kind_of(&other)
        ))),
    }
}

fn decode_entry(item: Value) -> Result<TaskResult, DecodeError> {
    let map = match item {
        Value::Object(map) => map,
        other => {
            return Err(DecodeError::UnexpectedShape(format!(
                "expected a result object, found {}",
                kind_of(&other)
            )))
        }
    };
    if map.len() != 1 {
        return Err(DecodeError::UnexpectedShape(format!(
            "expected one task identifier per entry, found {}",
            map.len()
        )));
    }
    let Some((key, inner)) = map.into_iter().next() else {
        return Err(DecodeError::UnexpectedShape("empty entry".to_string()));
    };

    let id: TaskId = key
        .parse()
        .map_err(|_| DecodeError::InvalidIdentifier(truncate(&key)))?;
    let entry: WireEntry = serde_json::from_value(inner)?;
    let success = decode_flag(&entry.success)?;
    let contents = decode_contents(entry.contents, entry.encoding.as_deref())?;

    Ok(TaskResult::try_new(id, contents, success)?)
}

fn decode_flag(value: &Value) -> Result<bool, DecodeError> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::String(s) if s == "true" => Ok(true),
        Value::String(s) if s == "false" => Ok(false),
        other => Err(DecodeError::InvalidSuccessFlag(truncate(&other.to_string()))),
    }
}

fn decode_contents(contents: String, encoding: Option<&str>) -> Result<Vec<u8>, DecodeError> {
    let bytes = match encoding {
        None => contents.into_bytes(),
        Some(BASE64_ENCODING) => {
            // Reject before allocating: base64 expands 3 bytes into 4 chars.
            if contents.len() / 4 * 3 > MAX_CONTENTS_LEN + 2 {
                return Err(DecodeError::ContentsTooLarge {
                    limit: MAX_CONTENTS_LEN,
                    actual: contents.len() / 4 * 3,
                });
            }
            STANDARD
                .decode(contents.as_bytes())
                .map_err(|e| DecodeError::InvalidContents(e.to_string()))?
        }
        Some(other) => {
            return Err(DecodeError::InvalidContents(format!(
                "unknown encoding '{}'",
                truncate(other)
            )))
        }
    };
    if bytes.len() > MAX_CONTENTS_LEN {
        return Err(DecodeError::ContentsTooLarge {
            limit: MAX_CONTENTS_LEN,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Keeps attacker-supplied text in error messages short.
fn truncate(s: &str) -> String {
    const MAX: usize = 64;
    if s.len() <= MAX {
        return s.to_string();
    }
    let mut end = MAX;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
