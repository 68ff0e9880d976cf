//! Request orchestrator: the per-call lifecycle from trigger to reply or pending.
//!
//! ```text
//! INIT -> TRIGGERING -> { TRIGGER_FAILED, INLINE_REPLIED, AWAITING_REPLY }
//! AWAITING_REPLY -> { POLLED_REPLIED, PENDING }
//! ```
//! Status-only calls enter at `AWAITING_REPLY` with a caller-supplied correlator.
//!
//! Every call runs against one cutoff, `poll.deadlineMs` after it arrives. Trigger attempts,
//! the conflict pause and polling all stop at that cutoff, and running out of time ends in
//! `PENDING`.

use crate::bridge::candidates::{self, Candidate};
use crate::bridge::error::BridgeError;
use crate::bridge::poll::{poll, PollPlan};
use crate::bridge::select::time_left;
use crate::bridge::trigger::{dispatch, Dispatched, TriggerMessage, TriggerRequest};
use crate::config::{self, Config, ConflictPolicy, PollConfig, UpstreamSettings};
use crate::upstream::UpstreamClient;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle phases. `TriggerFailed` is carried by the `Err` side of [`Bridge::handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Triggering,
    TriggerFailed,
    InlineReplied,
    AwaitingReply,
    PolledReplied,
    Pending,
}

/// Trigger-mode input, as received from the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerInput {
    pub message: Option<TriggerMessage>,
    pub thread_id: Option<String>,
    pub marketing_consent: bool,
    pub customer: Option<Value>,
    pub context: Option<Value>,
    pub unique_id: Option<Value>,
    pub channel: Option<Value>,
}

/// One inbound call.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeCall {
    Trigger(TriggerInput),
    /// Skip the trigger and poll for an existing correlator.
    StatusOnly { conversation_id: Option<String> },
}

/// Successful terminal result: a reply, or pending with the correlator to poll later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeReply {
    pub phase: Phase,
    pub reply: Option<String>,
    pub conversation_id: Option<String>,
}

impl BridgeReply {
    pub fn pending(&self) -> bool {
        self.reply.is_none()
    }

    /// Response JSON: `reply` when known, `pending`, `conversation_id` (nullable).
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "pending": self.pending(),
            "conversation_id": self.conversation_id,
        });
        if let Some(reply) = &self.reply {
            body["reply"] = Value::String(reply.clone());
        }
        body
    }
}

/// The agent bridge. Holds resolved settings and a shared HTTP client; no per-call state.
#[derive(Clone)]
pub struct Bridge {
    settings: UpstreamSettings,
    poll: PollConfig,
    conflict: ConflictPolicy,
    client: UpstreamClient,
}

impl Bridge {
    pub fn new(settings: UpstreamSettings, poll: PollConfig, conflict: ConflictPolicy) -> Self {
        let client = UpstreamClient::new(Some(settings.request_timeout));
        Self {
            settings,
            poll,
            conflict,
            client,
        }
    }

    /// Build from config, applying env overrides once.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config::resolve_upstream(config),
            config.poll.clone(),
            config.conflict_policy,
        )
    }

    pub fn settings(&self) -> &UpstreamSettings {
        &self.settings
    }

    /// Hard deadline for a call arriving now.
    fn cutoff(&self) -> Instant {
        Instant::now() + Duration::from_millis(self.poll.deadline_ms)
    }

    /// Run one call to a terminal phase.
    pub async fn handle(&self, request_id: &str, call: BridgeCall) -> Result<BridgeReply, BridgeError> {
        let cutoff = self.cutoff();
        match call {
            BridgeCall::Trigger(input) => {
                let result = self.trigger(request_id, input, cutoff).await;
                match &result {
                    Ok(reply) => log::debug!("[{}] terminal phase {:?}", request_id, reply.phase),
                    Err(e) => log::warn!("[{}] {:?}: {}", request_id, Phase::TriggerFailed, e),
                }
                result
            }
            BridgeCall::StatusOnly { conversation_id } => {
                let result = self.status_only(request_id, conversation_id, cutoff).await;
                match &result {
                    Ok(reply) => log::debug!("[{}] terminal phase {:?}", request_id, reply.phase),
                    Err(e) => log::warn!("[{}] status check failed: {}", request_id, e),
                }
                result
            }
        }
    }

    async fn trigger(
        &self,
        request_id: &str,
        input: TriggerInput,
        cutoff: Instant,
    ) -> Result<BridgeReply, BridgeError> {
        log::debug!("[{}] {:?}", request_id, Phase::Init);
        let (creds, candidates) = candidates::generate(&self.settings)?;
        let message = input
            .message
            .filter(|m| !m.is_empty())
            .ok_or_else(|| BridgeError::BadRequest("Missing 'message' in body".to_string()))?;

        let request = TriggerRequest {
            agent_id: creds.agent_id.clone(),
            message: message.into_chat(),
            conversation_id: input.thread_id.clone(),
            unique_id: input.unique_id,
            channel: input.channel,
            context: input.context,
            customer: input.customer,
            marketing_consent: input.marketing_consent,
        };

        log::debug!(
            "[{}] {:?} across {} candidate(s)",
            request_id,
            Phase::Triggering,
            candidates.len()
        );
        let outcome = match dispatch(&self.client, &request, &candidates, cutoff).await? {
            Dispatched::Answered(outcome) => outcome,
            Dispatched::OutOfTime { attempts } => {
                log::warn!(
                    "[{}] out of time during trigger after {} attempt(s)",
                    request_id,
                    attempts.len()
                );
                return Ok(BridgeReply {
                    phase: Phase::Pending,
                    reply: None,
                    conversation_id: request.conversation_id,
                });
            }
        };
        if !outcome.accepted {
            return Err(BridgeError::UpstreamRejected {
                status: outcome.http_status,
                body: outcome.raw_body,
            });
        }
        log::info!(
            "[{}] trigger accepted by {} with status {} after {} attempt(s)",
            request_id,
            outcome.candidate,
            outcome.http_status,
            outcome.attempts.len()
        );
        let conflict = outcome.is_conflict();

        if let Some(reply) = outcome.inline_reply {
            return Ok(BridgeReply {
                phase: Phase::InlineReplied,
                reply: Some(reply),
                conversation_id: outcome.correlation_id,
            });
        }

        let Some(correlator) = outcome.correlation_id else {
            log::warn!("[{}] no correlator and no thread id; nothing to poll", request_id);
            return Ok(BridgeReply {
                phase: Phase::Pending,
                reply: None,
                conversation_id: None,
            });
        };

        if conflict {
            match self.conflict {
                ConflictPolicy::Pending => {
                    log::debug!("[{}] trigger already running, answering pending", request_id);
                    return Ok(BridgeReply {
                        phase: Phase::Pending,
                        reply: None,
                        conversation_id: Some(correlator),
                    });
                }
                ConflictPolicy::DelayedPoll { pause_ms } => {
                    if let Some(remaining) = time_left(cutoff) {
                        tokio::time::sleep(Duration::from_millis(pause_ms).min(remaining)).await;
                    }
                }
                ConflictPolicy::ImmediatePoll => {}
            }
        }

        // The credential that worked for the trigger is the one used for polling.
        self.await_reply(
            request_id,
            &creds.agent_id,
            correlator,
            std::slice::from_ref(&outcome.candidate),
            PollPlan::from_config(&self.poll),
            cutoff,
        )
        .await
    }

    async fn status_only(
        &self,
        request_id: &str,
        conversation_id: Option<String>,
        cutoff: Instant,
    ) -> Result<BridgeReply, BridgeError> {
        let correlator = conversation_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(BridgeError::MissingCorrelator)?;
        let (creds, candidates) = candidates::generate(&self.settings)?;
        self.await_reply(
            request_id,
            &creds.agent_id,
            correlator,
            &candidates,
            PollPlan::status_only(&self.poll),
            cutoff,
        )
        .await
    }

    async fn await_reply(
        &self,
        request_id: &str,
        agent_id: &str,
        correlator: String,
        candidates: &[Candidate],
        plan: PollPlan,
        cutoff: Instant,
    ) -> Result<BridgeReply, BridgeError> {
        log::debug!(
            "[{}] {:?} for {} ({:?})",
            request_id,
            Phase::AwaitingReply,
            correlator,
            plan.deadline
        );
        let outcome = poll(&self.client, &correlator, agent_id, candidates, plan, cutoff).await;
        let phase = if outcome.reply.is_some() {
            Phase::PolledReplied
        } else {
            Phase::Pending
        };
        Ok(BridgeReply {
            phase,
            reply: outcome.reply,
            conversation_id: Some(correlator),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_body_has_null_reply_omitted() {
        let r = BridgeReply {
            phase: Phase::Pending,
            reply: None,
            conversation_id: Some("c1".into()),
        };
        assert_eq!(r.to_body(), json!({ "pending": true, "conversation_id": "c1" }));
    }

    #[test]
    fn reply_body_is_not_pending() {
        let r = BridgeReply {
            phase: Phase::InlineReplied,
            reply: Some("Hello!".into()),
            conversation_id: None,
        };
        assert_eq!(
            r.to_body(),
            json!({ "reply": "Hello!", "pending": false, "conversation_id": null })
        );
    }

    #[tokio::test]
    async fn status_only_without_correlator_fails_fast() {
        let bridge = Bridge::new(
            UpstreamSettings::default(),
            PollConfig::default(),
            ConflictPolicy::default(),
        );
        let err = bridge
            .handle("t", BridgeCall::StatusOnly { conversation_id: None })
            .await
            .expect_err("no correlator");
        assert_eq!(err, BridgeError::MissingCorrelator);
    }

    #[tokio::test]
    async fn configuration_is_checked_before_message() {
        let bridge = Bridge::new(
            UpstreamSettings::default(),
            PollConfig::default(),
            ConflictPolicy::default(),
        );
        let err = bridge
            .handle("t", BridgeCall::Trigger(TriggerInput::default()))
            .await
            .expect_err("nothing configured");
        assert!(matches!(err, BridgeError::Configuration { .. }));
    }
}
