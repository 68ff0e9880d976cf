//! Correlation id resolution: the identifier tying a trigger call to later status calls.
//!
//! The upstream uses several keys for it; they are checked in a fixed order at the top level,
//! then one level down under `data`. The value is opaque and passed through unvalidated.

use serde_json::{Map, Value};

const ID_KEYS: &[&str] = &[
    "conversation_id",
    "conversationId",
    "task_id",
    "taskId",
    "id",
    "run_id",
    "job_id",
];

fn id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn scan_keys(obj: &Map<String, Value>) -> Option<String> {
    ID_KEYS.iter().find_map(|k| obj.get(*k).and_then(id_value))
}

/// Correlator from `payload`, else `fallback` (typically the caller's thread id), else `None`.
pub fn resolve_id(payload: &Value, fallback: Option<&str>) -> Option<String> {
    payload
        .as_object()
        .and_then(|obj| {
            scan_keys(obj).or_else(|| obj.get("data").and_then(Value::as_object).and_then(scan_keys))
        })
        .or_else(|| {
            fallback
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn priority_order_is_respected() {
        assert_eq!(
            resolve_id(&json!({ "conversation_id": "x", "id": "y" }), None).as_deref(),
            Some("x")
        );
        assert_eq!(
            resolve_id(&json!({ "job_id": "j", "task_id": "t" }), None).as_deref(),
            Some("t")
        );
    }

    #[test]
    fn falls_back_to_thread_id() {
        assert_eq!(resolve_id(&json!({}), Some("fallback")).as_deref(), Some("fallback"));
        assert_eq!(resolve_id(&Value::Null, Some("  ")), None);
        assert_eq!(resolve_id(&json!({}), None), None);
    }

    #[test]
    fn nested_data_is_scanned_after_top_level() {
        let payload = json!({ "data": { "run_id": "r1" } });
        assert_eq!(resolve_id(&payload, Some("thread")).as_deref(), Some("r1"));
        let payload = json!({ "id": "top", "data": { "conversation_id": "inner" } });
        assert_eq!(resolve_id(&payload, None).as_deref(), Some("top"));
    }

    #[test]
    fn numeric_ids_become_strings_and_blanks_are_skipped() {
        let payload = json!({ "conversation_id": "", "task_id": 42 });
        assert_eq!(resolve_id(&payload, None).as_deref(), Some("42"));
    }
}
