//! Trigger dispatcher: submit the user's message across the candidate matrix.
//!
//! Each POST may cause business effects upstream, so the only retrying done is the candidate
//! fallback below; callers must not retry a dispatch.

use crate::bridge::candidates::Candidate;
use crate::bridge::correlation::resolve_id;
use crate::bridge::error::BridgeError;
use crate::bridge::extract::extract_inline;
use crate::bridge::select::{select_working_candidate, time_left, Attempt, Decision, Tried, Verdict};
use crate::upstream::{UpstreamClient, UpstreamResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

pub const TRIGGER_PATH: &str = "/latest/agents/trigger";

/// Statuses meaning success, accepted for async processing, or already running.
pub const ACCEPTED_STATUSES: [u16; 4] = [200, 201, 202, 409];

/// Statuses meaning the credential was wrong for this host.
pub const AUTH_FAILURE_STATUSES: [u16; 2] = [401, 403];

fn default_role() -> String {
    "user".to_string()
}

/// Outbound message: `{role, content}` or a bare string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerMessage {
    Chat {
        #[serde(default = "default_role")]
        role: String,
        content: Value,
    },
    Text(String),
}

impl TriggerMessage {
    /// Bare strings are sent as a user turn.
    pub fn into_chat(self) -> Self {
        match self {
            TriggerMessage::Text(content) => TriggerMessage::Chat {
                role: default_role(),
                content: Value::String(content),
            },
            chat => chat,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TriggerMessage::Text(s) => s.trim().is_empty(),
            TriggerMessage::Chat { content, .. } => match content {
                Value::Null => true,
                Value::String(s) => s.trim().is_empty(),
                _ => false,
            },
        }
    }
}

/// Body POSTed to the trigger endpoint. Forwarded as given apart from the consent default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerRequest {
    pub agent_id: String,
    pub message: TriggerMessage,
    /// Client-supplied thread correlator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<Value>,
    pub marketing_consent: bool,
}

/// Answer from the candidate that ended a dispatch. `accepted` is false when it was a definitive failure.
#[derive(Debug, Clone)]
pub struct TriggerOutcome {
    pub accepted: bool,
    pub http_status: u16,
    /// Candidate that produced the answer; reused for every poll in this lifecycle.
    pub candidate: Candidate,
    pub inline_reply: Option<String>,
    pub correlation_id: Option<String>,
    pub raw_body: String,
    pub attempts: Vec<Attempt<Candidate>>,
}

impl TriggerOutcome {
    pub fn is_conflict(&self) -> bool {
        self.http_status == 409
    }
}

/// How a dispatch ended.
#[derive(Debug, Clone)]
pub enum Dispatched {
    /// A candidate accepted or definitively rejected the message.
    Answered(TriggerOutcome),
    /// The call deadline passed before any candidate answered. The upstream may still have
    /// received the message.
    OutOfTime { attempts: Vec<Attempt<Candidate>> },
}

/// Trigger URL for a host.
pub fn trigger_url(host: &str) -> String {
    format!("{}{}", host, TRIGGER_PATH)
}

fn classify(res: Result<UpstreamResponse, crate::upstream::UpstreamError>) -> Tried<UpstreamResponse> {
    match res {
        Err(e) => {
            log::debug!("trigger transport error: {}", e);
            Tried::unreachable()
        }
        Ok(r) if AUTH_FAILURE_STATUSES.contains(&r.status) => Tried::new(Some(r.status), Verdict::Skip),
        Ok(r) if ACCEPTED_STATUSES.contains(&r.status) => {
            Tried::new(Some(r.status), Verdict::Accept(r))
        }
        Ok(r) => Tried::new(Some(r.status), Verdict::Surface(r)),
    }
}

/// POST `request` to each candidate in order until one accepts or definitively fails.
/// No candidate is started after `cutoff`, and each POST is limited to the time left.
pub async fn dispatch(
    client: &UpstreamClient,
    request: &TriggerRequest,
    candidates: &[Candidate],
    cutoff: Instant,
) -> Result<Dispatched, BridgeError> {
    let selection = select_working_candidate(candidates, move |_, candidate| async move {
        let Some(remaining) = time_left(cutoff) else {
            return Tried::halt();
        };
        let url = trigger_url(&candidate.host);
        classify(
            client
                .post_json(&url, &candidate.auth_header, request, Some(remaining))
                .await,
        )
    })
    .await;

    let (accepted, index, response) = match selection.decision {
        Decision::Accepted { index, value } => (true, index, value),
        Decision::Surfaced { index, value } => (false, index, value),
        Decision::Halted => {
            log::warn!(
                "trigger: call deadline reached after {} attempt(s)",
                selection.attempts.len()
            );
            return Ok(Dispatched::OutOfTime {
                attempts: selection.attempts,
            });
        }
        Decision::Exhausted => {
            log::warn!(
                "trigger: no candidate reachable with a working credential ({} attempt(s))",
                selection.attempts.len()
            );
            return Err(BridgeError::UpstreamUnreachable {
                attempts: selection.attempts.len(),
            });
        }
    };

    let payload = response.json();
    // A 409 body describes the running task, not an answer to this message.
    let inline_reply = if accepted && response.status != 409 {
        extract_inline(&payload)
    } else {
        None
    };
    let correlation_id = resolve_id(&payload, request.conversation_id.as_deref());
    Ok(Dispatched::Answered(TriggerOutcome {
        accepted,
        http_status: response.status,
        candidate: candidates[index].clone(),
        inline_reply,
        correlation_id,
        raw_body: response.body,
        attempts: selection.attempts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_text_becomes_user_turn() {
        let m = TriggerMessage::Text("hi".into()).into_chat();
        assert_eq!(
            serde_json::to_value(&m).expect("serialize"),
            json!({ "role": "user", "content": "hi" })
        );
    }

    #[test]
    fn structured_message_deserializes_with_default_role() {
        let m: TriggerMessage =
            serde_json::from_value(json!({ "content": "hello" })).expect("parse message");
        assert_eq!(
            m,
            TriggerMessage::Chat {
                role: "user".into(),
                content: json!("hello")
            }
        );
        let m: TriggerMessage = serde_json::from_value(json!("plain")).expect("parse text");
        assert_eq!(m, TriggerMessage::Text("plain".into()));
    }

    #[test]
    fn request_skips_absent_fields() {
        let req = TriggerRequest {
            agent_id: "agent".into(),
            message: TriggerMessage::Text("hi".into()).into_chat(),
            conversation_id: None,
            unique_id: None,
            channel: None,
            context: None,
            customer: None,
            marketing_consent: false,
        };
        assert_eq!(
            serde_json::to_value(&req).expect("serialize"),
            json!({
                "agent_id": "agent",
                "message": { "role": "user", "content": "hi" },
                "marketing_consent": false
            })
        );
    }

    #[test]
    fn status_classification() {
        let tried = classify(Ok(UpstreamResponse { status: 403, body: String::new() }));
        assert!(matches!(tried.verdict, Verdict::Skip));
        let tried = classify(Ok(UpstreamResponse { status: 409, body: String::new() }));
        assert!(matches!(tried.verdict, Verdict::Accept(_)));
        let tried = classify(Ok(UpstreamResponse { status: 500, body: String::new() }));
        assert!(matches!(tried.verdict, Verdict::Surface(_)));
    }
}
