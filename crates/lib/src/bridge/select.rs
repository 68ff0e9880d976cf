//! Sequential candidate selection shared by the trigger dispatcher and the poll engine.
//!
//! Items are tried strictly one at a time, in order. Each attempt reports the HTTP status it
//! saw (or none on transport failure) and a [`Verdict`]; the first `Accept` or `Surface`
//! ends the run.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// What a single attempt concluded.
#[derive(Debug)]
pub enum Verdict<T> {
    /// This item works; stop here.
    Accept(T),
    /// Definitive answer that is not acceptable; stop and report it.
    Surface(T),
    /// Move on to the next item.
    Skip,
    /// Stop without trying further items (deadline reached). Not recorded as an attempt.
    Halt,
}

/// Status seen by one attempt plus its verdict.
#[derive(Debug)]
pub struct Tried<T> {
    /// HTTP status, or `None` when the call never completed.
    pub status: Option<u16>,
    pub verdict: Verdict<T>,
}

impl<T> Tried<T> {
    pub fn new(status: Option<u16>, verdict: Verdict<T>) -> Self {
        Self { status, verdict }
    }

    pub fn unreachable() -> Self {
        Self::new(None, Verdict::Skip)
    }

    pub fn halt() -> Self {
        Self::new(None, Verdict::Halt)
    }
}

/// One recorded attempt, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt<I> {
    pub target: I,
    pub status: Option<u16>,
}

#[derive(Debug)]
pub enum Decision<T> {
    Accepted { index: usize, value: T },
    Surfaced { index: usize, value: T },
    /// Every item was tried and skipped.
    Exhausted,
    /// An attempt asked to stop before the items ran out.
    Halted,
}

/// Result of a selection run: the decision and every attempt made.
#[derive(Debug)]
pub struct Selection<I, T> {
    pub decision: Decision<T>,
    pub attempts: Vec<Attempt<I>>,
}

/// Time left before `cutoff`, or `None` once it has passed.
pub fn time_left(cutoff: Instant) -> Option<Duration> {
    let now = Instant::now();
    (now < cutoff).then(|| cutoff - now)
}

/// Try `items` in order with `attempt` until one is accepted or surfaced.
pub async fn select_working_candidate<'c, I, T, F, Fut>(
    items: &'c [I],
    mut attempt: F,
) -> Selection<I, T>
where
    I: Clone + fmt::Display,
    F: FnMut(usize, &'c I) -> Fut,
    Fut: Future<Output = Tried<T>>,
{
    let mut attempts = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let tried = attempt(index, item).await;
        if matches!(tried.verdict, Verdict::Halt) {
            log::debug!("candidate selection halted before {}", item);
            return Selection {
                decision: Decision::Halted,
                attempts,
            };
        }
        match tried.status {
            Some(status) => log::debug!("attempt {} -> {}: {}", index + 1, item, status),
            None => log::debug!("attempt {} -> {}: unreachable", index + 1, item),
        }
        attempts.push(Attempt {
            target: item.clone(),
            status: tried.status,
        });
        match tried.verdict {
            Verdict::Accept(value) => {
                return Selection {
                    decision: Decision::Accepted { index, value },
                    attempts,
                }
            }
            Verdict::Surface(value) => {
                return Selection {
                    decision: Decision::Surfaced { index, value },
                    attempts,
                }
            }
            Verdict::Skip | Verdict::Halt => {}
        }
    }
    Selection {
        decision: Decision::Exhausted,
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_left_is_none_after_cutoff() {
        let past = Instant::now() - Duration::from_millis(5);
        assert_eq!(time_left(past), None);
        let left = time_left(Instant::now() + Duration::from_secs(5)).expect("time left");
        assert!(left > Duration::from_secs(4));
    }

    #[tokio::test]
    async fn stops_at_first_accepted_item() {
        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let statuses = [401u16, 202, 200];
        let sel = select_working_candidate(&items, |i, _| async move {
            let status = statuses[i];
            if status == 401 {
                Tried::new(Some(status), Verdict::Skip)
            } else {
                Tried::new(Some(status), Verdict::Accept(status))
            }
        })
        .await;
        assert!(matches!(
            sel.decision,
            Decision::Accepted { index: 1, value: 202 }
        ));
        assert_eq!(sel.attempts.len(), 2);
        assert_eq!(sel.attempts[0].status, Some(401));
    }

    #[tokio::test]
    async fn surfaced_item_ends_the_run() {
        let items = vec!["a".to_string(), "b".to_string()];
        let sel = select_working_candidate(&items, |_, _| async {
            Tried::new(Some(500), Verdict::Surface("boom"))
        })
        .await;
        assert!(matches!(sel.decision, Decision::Surfaced { index: 0, .. }));
        assert_eq!(sel.attempts.len(), 1);
    }

    #[tokio::test]
    async fn all_skipped_is_exhausted() {
        let items = vec!["a".to_string(), "b".to_string()];
        let sel = select_working_candidate(&items, |_, _| async { Tried::<()>::unreachable() }).await;
        assert!(matches!(sel.decision, Decision::Exhausted));
        assert_eq!(sel.attempts.len(), 2);
    }

    #[tokio::test]
    async fn halt_stops_the_run_and_is_not_recorded() {
        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let sel = select_working_candidate(&items, |i, _| async move {
            if i < 2 {
                Tried::<()>::unreachable()
            } else {
                Tried::halt()
            }
        })
        .await;
        assert!(matches!(sel.decision, Decision::Halted));
        assert_eq!(sel.attempts.len(), 2);
        assert!(sel.attempts.iter().all(|a| a.status.is_none()));
    }
}
