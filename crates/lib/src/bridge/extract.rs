//! Reply extraction: find the assistant's text in an arbitrary upstream JSON payload.
//!
//! A payload is classified into the shapes it exhibits ([`ReplyShape`]), in priority order,
//! and the first shape yielding a non-empty trimmed string wins. The recursive scan runs
//! only for [`ReplyShape::Unknown`], which is always last. Nothing here fails: a payload
//! without a match yields `None`.

use serde_json::{Map, Value};
use std::collections::VecDeque;

/// Direct fields on a step object.
const STEP_FIELDS: &[&str] = &["assistant_message", "output", "message", "text"];
/// Nested sequences on a step that may hold tool or agent output.
const STEP_OUTPUT_LISTS: &[&str] = &["outputs", "tool_outputs"];
/// Role-like keys on a message entry.
const ROLE_FIELDS: &[&str] = &["role", "sender"];
/// Text-bearing keys on a message entry.
const MESSAGE_FIELDS: &[&str] = &["text", "message", "content", "output"];
/// Top-level (and `data`-level) fields, in priority order.
const FLAT_FIELDS: &[&str] = &[
    "assistant_reply",
    "latest_assistant_message",
    "assistant",
    "reply",
    "output",
    "message",
    "text",
];
/// Keys checked when a candidate field is itself an object.
const NESTED_TEXT_FIELDS: &[&str] = &["text", "content", "message"];
/// Fields that count as a reply inside a trigger answer (top level or under `data`). Status
/// keys such as `message` and `detail` are not read.
const INLINE_FIELDS: &[&str] = &["assistant_reply", "reply", "output"];
/// Subtrees the recursive scan never enters: caller input and error reports. Echoed caller
/// input never comes back as the reply.
const SCAN_SKIP_KEYS: &[&str] = &[
    "input", "inputs", "params", "request", "customer", "context", "error", "errors",
];
/// Scan hits need more than this many chars, terminal punctuation, and at least one
/// whitespace char (which keeps URLs and file names like `a.png` out).
const SCAN_MIN_CHARS: usize = 12;
const NESTED_DEPTH: usize = 3;

/// Shapes an upstream payload can take.
#[derive(Debug, Clone, Copy)]
pub enum ReplyShape<'a> {
    /// `{"steps": [...]}`: agent step log, newest last.
    Steps(&'a [Value]),
    /// `{"messages": [...]}`: chat transcript, newest last.
    Messages(&'a [Value]),
    /// Any object: well-known reply fields at top level or under `data`.
    Flat(&'a Map<String, Value>),
    /// Anything else; searched recursively.
    Unknown(&'a Value),
}

impl<'a> ReplyShape<'a> {
    /// Shapes exhibited by `payload`, in search order. `Unknown` is always last.
    pub fn classify(payload: &'a Value) -> Vec<ReplyShape<'a>> {
        let mut shapes = Vec::with_capacity(4);
        if let Some(obj) = payload.as_object() {
            if let Some(steps) = obj.get("steps").and_then(Value::as_array) {
                shapes.push(ReplyShape::Steps(steps));
            }
            if let Some(messages) = obj.get("messages").and_then(Value::as_array) {
                shapes.push(ReplyShape::Messages(messages));
            }
            shapes.push(ReplyShape::Flat(obj));
        }
        shapes.push(ReplyShape::Unknown(payload));
        shapes
    }

    /// Reply text found in this shape, if any.
    pub fn reply(&self) -> Option<String> {
        match self {
            ReplyShape::Steps(steps) => from_steps(steps),
            ReplyShape::Messages(messages) => from_messages(messages),
            ReplyShape::Flat(obj) => from_flat(obj),
            ReplyShape::Unknown(value) => scan(value),
        }
    }

    /// Like [`ReplyShape::reply`], for trigger answers: `Unknown` yields nothing.
    pub fn inline_reply(&self) -> Option<String> {
        match self {
            ReplyShape::Flat(obj) => from_fields(obj, INLINE_FIELDS),
            ReplyShape::Unknown(_) => None,
            shape => shape.reply(),
        }
    }
}

/// Most likely human-readable assistant reply in `payload`.
pub fn extract(payload: &Value) -> Option<String> {
    ReplyShape::classify(payload)
        .iter()
        .find_map(ReplyShape::reply)
}

/// Reply carried inline by a trigger answer. Only the structured shapes are read: no
/// recursive scan, and flat fields limited to reply-like keys.
pub fn extract_inline(payload: &Value) -> Option<String> {
    ReplyShape::classify(payload)
        .iter()
        .find_map(ReplyShape::inline_reply)
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Text of a value: a string, an object's text/content/message, or the joined text parts of an array.
fn text_of(value: &Value) -> Option<String> {
    raw_text(value, NESTED_DEPTH).and_then(|s| non_empty(&s))
}

// Untrimmed so that joined content parts keep their spacing.
fn raw_text(value: &Value, depth: usize) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(obj) if depth > 0 => NESTED_TEXT_FIELDS
            .iter()
            .find_map(|k| obj.get(*k).and_then(|v| raw_text(v, depth - 1))),
        Value::Array(parts) if depth > 0 => {
            let joined: String = parts
                .iter()
                .filter_map(|p| raw_text(p, depth - 1))
                .collect();
            if joined.trim().is_empty() {
                None
            } else {
                Some(joined)
            }
        }
        _ => None,
    }
}

fn role_of(entry: &Map<String, Value>) -> Option<String> {
    ROLE_FIELDS
        .iter()
        .find_map(|k| entry.get(*k).and_then(Value::as_str))
        .map(|r| r.to_lowercase())
}

fn from_steps(steps: &[Value]) -> Option<String> {
    steps.iter().rev().filter_map(Value::as_object).find_map(|step| {
        if role_of(step).is_some_and(|r| r.contains("user")) {
            return None;
        }
        STEP_FIELDS
            .iter()
            .find_map(|k| step.get(*k).and_then(text_of))
            .or_else(|| {
                STEP_OUTPUT_LISTS.iter().find_map(|k| {
                    step.get(*k)
                        .and_then(Value::as_array)
                        .and_then(|outputs| outputs.iter().rev().find_map(text_of))
                })
            })
    })
}

fn from_messages(messages: &[Value]) -> Option<String> {
    messages
        .iter()
        .rev()
        .filter_map(Value::as_object)
        .filter(|m| role_of(m).is_some_and(|r| r.contains("assistant")))
        .find_map(|m| MESSAGE_FIELDS.iter().find_map(|k| m.get(*k).and_then(text_of)))
}

fn fields_of(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|k| obj.get(*k).and_then(text_of))
}

/// `fields` at the top level, then under `data`.
fn from_fields(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields_of(obj, fields).or_else(|| {
        obj.get("data")
            .and_then(Value::as_object)
            .and_then(|data| fields_of(data, fields))
    })
}

fn from_flat(obj: &Map<String, Value>) -> Option<String> {
    from_fields(obj, FLAT_FIELDS)
}

fn looks_like_prose(s: &str) -> bool {
    let t = s.trim();
    t.chars().count() > SCAN_MIN_CHARS
        && t.contains(char::is_whitespace)
        && t.contains(['.', '!', '?'])
}

/// Breadth-first scan for the first prose-like string, skipping caller input and user turns.
fn scan(root: &Value) -> Option<String> {
    let mut queue: VecDeque<&Value> = VecDeque::new();
    queue.push_back(root);
    while let Some(value) = queue.pop_front() {
        match value {
            Value::String(s) if looks_like_prose(s) => return non_empty(s),
            Value::Array(items) => queue.extend(items.iter()),
            Value::Object(obj) => {
                if role_of(obj).is_some_and(|r| r.contains("user")) {
                    continue;
                }
                queue.extend(
                    obj.iter()
                        .filter(|(k, _)| !SCAN_SKIP_KEYS.contains(&k.as_str()))
                        .map(|(_, v)| v),
                );
            }
            _ => {}
        }
    }
    None
}
