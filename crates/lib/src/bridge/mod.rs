//! Agent bridge: candidate resolution, trigger dispatch, reply extraction and polling.
//!
//! Stateless per call. Everything built here (candidates, outcomes, correlators) lives for
//! one request and is dropped with it.

pub mod candidates;
pub mod correlation;
mod error;
pub mod extract;
mod orchestrator;
pub mod poll;
pub mod select;
pub mod trigger;

pub use candidates::{AuthFormat, Candidate, Credentials};
pub use correlation::resolve_id;
pub use error::{truncate_chars, BridgeError, MAX_ECHOED_BODY_CHARS};
pub use extract::{extract, extract_inline, ReplyShape};
pub use orchestrator::{Bridge, BridgeCall, BridgeReply, Phase, TriggerInput};
pub use poll::{PollDeadline, PollOutcome, PollPlan};
pub use trigger::{TriggerMessage, TriggerOutcome, TriggerRequest};
