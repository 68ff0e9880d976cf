//! Inbound chat protocol: the JSON body POSTed by the chat UI.
//!
//! Fields are read leniently (strings or numbers for ids, JS-style truthiness for flags) since
//! the body may arrive as `text/plain` from a browser form.

use crate::bridge::{BridgeCall, TriggerInput, TriggerMessage};
use serde::Deserialize;
use serde_json::Value;

/// Wire request. Trigger mode: `message` plus optional fields. Status mode: `status_only: true`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub thread_id: Option<Value>,
    #[serde(default)]
    pub marketing_consent: Option<Value>,
    #[serde(default)]
    pub customer: Option<Value>,
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub unique_id: Option<Value>,
    #[serde(default)]
    pub channel: Option<Value>,
    #[serde(default)]
    pub status_only: Option<Value>,
    #[serde(default)]
    pub conversation_id: Option<Value>,
}

/// Parse a raw body regardless of declared content type. Anything unparsable is an empty request.
pub fn parse_chat_request(body: &[u8]) -> ChatRequest {
    serde_json::from_slice::<Value>(body)
        .ok()
        .filter(Value::is_object)
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// JS-style truthiness: false, 0, "", null and absent are false.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Id-like field as a string; blank strings count as absent.
fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn message_of(value: Option<Value>) -> Option<TriggerMessage> {
    match value? {
        Value::String(s) => Some(TriggerMessage::Text(s)),
        obj @ Value::Object(_) => serde_json::from_value(obj).ok(),
        _ => None,
    }
}

impl ChatRequest {
    pub fn is_status_only(&self) -> bool {
        truthy(self.status_only.as_ref())
    }

    /// Map the wire request onto a bridge call. Status mode falls back to `thread_id`.
    pub fn into_call(self) -> BridgeCall {
        if self.is_status_only() {
            let conversation_id = id_string(self.conversation_id.as_ref())
                .or_else(|| id_string(self.thread_id.as_ref()));
            return BridgeCall::StatusOnly { conversation_id };
        }
        BridgeCall::Trigger(TriggerInput {
            thread_id: id_string(self.thread_id.as_ref()),
            marketing_consent: truthy(self.marketing_consent.as_ref()),
            message: message_of(self.message),
            customer: self.customer,
            context: self.context,
            unique_id: self.unique_id,
            channel: self.channel,
        })
    }
}
