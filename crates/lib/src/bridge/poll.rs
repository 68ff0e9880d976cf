//! Poll engine: sweep status endpoints for a correlator until a reply appears or the deadline passes.
//!
//! A sweep tries every candidate against every status URL, in order. Transport errors and
//! non-2xx answers are skipped. Between sweeps the engine sleeps a fixed interval; running out
//! of budget yields `reply: None` (pending), never an error.

use crate::bridge::candidates::Candidate;
use crate::bridge::extract::extract;
use crate::bridge::select::{select_working_candidate, time_left, Attempt, Decision, Tried, Verdict};
use crate::config::{PollConfig, PollMode};
use crate::upstream::UpstreamClient;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// When to give up polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDeadline {
    /// Bounded long-poll: stop once this much wall-clock time has elapsed.
    WallClock(Duration),
    /// Bounded short-poll: stop after this many sweeps. Zero means no sweep at all.
    Attempts(u32),
}

/// Deadline plus the fixed pause between sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPlan {
    pub deadline: PollDeadline,
    pub interval: Duration,
}

impl PollPlan {
    /// Plan used after a trigger, per the configured poll mode.
    pub fn from_config(config: &PollConfig) -> Self {
        let deadline = match config.mode {
            PollMode::LongPoll => PollDeadline::WallClock(Duration::from_millis(config.deadline_ms)),
            PollMode::ShortPoll => PollDeadline::Attempts(config.max_attempts),
        };
        Self {
            deadline,
            interval: config.interval(),
        }
    }

    /// Plan used by status-only calls.
    pub fn status_only(config: &PollConfig) -> Self {
        Self {
            deadline: PollDeadline::Attempts(config.status_only_attempts),
            interval: config.interval(),
        }
    }
}

/// One status URL paired with the candidate whose credential is sent to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTarget {
    pub candidate: Candidate,
    pub url: String,
}

impl fmt::Display for PollTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.candidate.format.label())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PollOutcome {
    pub reply: Option<String>,
    pub sweeps: u32,
    pub attempts: Vec<Attempt<PollTarget>>,
}

/// Status endpoints for a correlator, in priority order: steps, task view, conversation, task.
pub fn status_urls(host: &str, agent_id: &str, correlator: &str) -> Vec<String> {
    vec![
        format!("{}/latest/agents/{}/tasks/{}/steps", host, agent_id, correlator),
        format!("{}/latest/agents/{}/tasks/{}/view", host, agent_id, correlator),
        format!("{}/latest/agents/conversations/{}", host, correlator),
        format!("{}/latest/agents/tasks/{}", host, correlator),
        format!("{}/latest/tasks/{}", host, correlator),
    ]
}

/// Candidates outer, status URLs inner.
pub fn poll_targets(candidates: &[Candidate], agent_id: &str, correlator: &str) -> Vec<PollTarget> {
    candidates
        .iter()
        .flat_map(|c| {
            status_urls(&c.host, agent_id, correlator)
                .into_iter()
                .map(move |url| PollTarget {
                    candidate: c.clone(),
                    url,
                })
        })
        .collect()
}

/// Poll for a reply to `correlator`. The same correlator is used for every call.
/// `ceiling` is the whole call's deadline; a wall-clock plan stops at whichever comes first.
pub async fn poll(
    client: &UpstreamClient,
    correlator: &str,
    agent_id: &str,
    candidates: &[Candidate],
    plan: PollPlan,
    ceiling: Instant,
) -> PollOutcome {
    let targets = poll_targets(candidates, agent_id, correlator);
    let cutoff = match plan.deadline {
        PollDeadline::WallClock(d) => ceiling.min(Instant::now() + d),
        PollDeadline::Attempts(_) => ceiling,
    };
    let mut outcome = PollOutcome::default();

    loop {
        if let PollDeadline::Attempts(max) = plan.deadline {
            if outcome.sweeps >= max {
                break;
            }
        }
        if time_left(cutoff).is_none() {
            break;
        }
        outcome.sweeps += 1;

        let selection = select_working_candidate(&targets, move |_, target| async move {
            let Some(remaining) = time_left(cutoff) else {
                return Tried::halt();
            };
            match client
                .get(&target.url, &target.candidate.auth_header, Some(remaining))
                .await
            {
                Err(e) => {
                    log::debug!("poll transport error on {}: {}", target.url, e);
                    Tried::unreachable()
                }
                Ok(r) if !r.is_success() => Tried::new(Some(r.status), Verdict::Skip),
                Ok(r) => match extract(&r.json()) {
                    Some(reply) => Tried::new(Some(r.status), Verdict::Accept(reply)),
                    None => Tried::new(Some(r.status), Verdict::Skip),
                },
            }
        })
        .await;
        outcome.attempts.extend(selection.attempts);

        if let Decision::Accepted { value, .. } = selection.decision {
            log::debug!("poll: reply found after {} sweep(s)", outcome.sweeps);
            outcome.reply = Some(value);
            return outcome;
        }

        if let PollDeadline::Attempts(max) = plan.deadline {
            if outcome.sweeps >= max {
                break;
            }
        }
        let Some(remaining) = time_left(cutoff) else {
            break;
        };
        tokio::time::sleep(plan.interval.min(remaining)).await;
    }

    log::debug!(
        "poll: no reply for correlator after {} sweep(s), pending",
        outcome.sweeps
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::candidates::AuthFormat;

    fn candidate(host: &str) -> Candidate {
        Candidate {
            host: host.to_string(),
            auth_header: "k".to_string(),
            format: AuthFormat::BareKey,
        }
    }

    #[test]
    fn status_urls_embed_agent_and_correlator() {
        let urls = status_urls("https://h", "agent", "c1");
        assert_eq!(urls[0], "https://h/latest/agents/agent/tasks/c1/steps");
        assert_eq!(urls[2], "https://h/latest/agents/conversations/c1");
        assert_eq!(urls.len(), 5);
    }

    #[test]
    fn targets_iterate_candidates_outer() {
        let targets = poll_targets(&[candidate("https://a"), candidate("https://b")], "x", "c");
        assert_eq!(targets.len(), 10);
        assert!(targets[..5].iter().all(|t| t.url.starts_with("https://a/")));
        assert!(targets[5..].iter().all(|t| t.url.starts_with("https://b/")));
    }

    #[test]
    fn plan_follows_poll_mode() {
        let mut config = PollConfig::default();
        config.mode = PollMode::ShortPoll;
        config.max_attempts = 2;
        assert_eq!(PollPlan::from_config(&config).deadline, PollDeadline::Attempts(2));
        config.mode = PollMode::LongPoll;
        config.deadline_ms = 500;
        assert_eq!(
            PollPlan::from_config(&config).deadline,
            PollDeadline::WallClock(Duration::from_millis(500))
        );
        assert_eq!(PollPlan::status_only(&config).deadline, PollDeadline::Attempts(1));
    }

    #[tokio::test]
    async fn zero_attempts_returns_pending_without_calls() {
        let client = UpstreamClient::new(None);
        let plan = PollPlan {
            deadline: PollDeadline::Attempts(0),
            interval: Duration::from_millis(10),
        };
        let ceiling = Instant::now() + Duration::from_secs(5);
        let out = poll(&client, "c1", "agent", &[candidate("http://127.0.0.1:1")], plan, ceiling).await;
        assert_eq!(out.reply, None);
        assert_eq!(out.sweeps, 0);
        assert!(out.attempts.is_empty());
    }

    #[tokio::test]
    async fn passed_ceiling_cuts_a_wall_clock_plan_short() {
        let client = UpstreamClient::new(None);
        let plan = PollPlan {
            deadline: PollDeadline::WallClock(Duration::from_secs(30)),
            interval: Duration::from_millis(10),
        };
        let ceiling = Instant::now() - Duration::from_millis(1);
        let out = poll(&client, "c1", "agent", &[candidate("http://127.0.0.1:1")], plan, ceiling).await;
        assert_eq!(out.reply, None);
        assert_eq!(out.sweeps, 0);
    }
}
