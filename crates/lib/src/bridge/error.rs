//! Bridge error taxonomy and its JSON error envelope.

use serde_json::{json, Value};

/// Longest upstream body echoed back to the caller, in characters.
pub const MAX_ECHOED_BODY_CHARS: usize = 800;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Required settings absent; lists every missing item by env var name.
    #[error("missing configuration: {}", missing.join(", "))]
    Configuration { missing: Vec<String> },

    /// A setting is present but obviously wrong (e.g. project id equal to the region).
    #[error("{field} looks wrong: {hint}")]
    Misconfigured {
        field: String,
        got: String,
        hint: String,
    },

    /// Missing `message` in trigger mode.
    #[error("{0}")]
    BadRequest(String),

    /// Status-only mode without `conversation_id` or `thread_id`.
    #[error("missing conversation_id")]
    MissingCorrelator,

    /// No candidate could be contacted with a usable credential.
    #[error("failed to contact trigger endpoint after {attempts} attempt(s)")]
    UpstreamUnreachable { attempts: usize },

    /// A candidate answered with a definitive, non-accepted status.
    #[error("trigger failed with status {status}")]
    UpstreamRejected { status: u16, body: String },

    /// Anything else; reported as a string, never as a raw panic.
    #[error("internal fault: {0}")]
    Internal(String),
}

impl BridgeError {
    /// HTTP status for this error. Upstream rejections pass the upstream status through.
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::Configuration { .. } | BridgeError::Misconfigured { .. } => 500,
            BridgeError::BadRequest(_) | BridgeError::MissingCorrelator => 400,
            BridgeError::UpstreamUnreachable { .. } => 502,
            BridgeError::UpstreamRejected { status, .. } => {
                if (400..=599).contains(status) {
                    *status
                } else {
                    502
                }
            }
            BridgeError::Internal(_) => 500,
        }
    }

    /// JSON error envelope: stable `error` string plus diagnostics.
    pub fn to_body(&self) -> Value {
        match self {
            BridgeError::Configuration { missing } => json!({
                "error": "Missing env vars",
                "missing": missing,
            }),
            BridgeError::Misconfigured { field, got, hint } => json!({
                "error": format!("{} looks wrong", field),
                "got": got,
                "hint": hint,
            }),
            BridgeError::BadRequest(msg) => json!({ "error": msg }),
            BridgeError::MissingCorrelator => json!({ "error": "Missing conversation_id" }),
            BridgeError::UpstreamUnreachable { .. } => json!({
                "error": "Failed to contact trigger endpoint",
            }),
            BridgeError::UpstreamRejected { status, body } => json!({
                "error": "Trigger failed",
                "status": status,
                "body": truncate_chars(body, MAX_ECHOED_BODY_CHARS),
            }),
            BridgeError::Internal(details) => json!({
                "error": "Unhandled server error",
                "details": details,
            }),
        }
    }
}

/// First `max` characters of `s` (char boundary safe).
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
