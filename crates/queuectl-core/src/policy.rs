use chrono::{DateTime, Utc};

use crate::config::QueueConfig;
use crate::job::JobState;

/// Outcome of a single execution attempt, fed into [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success,
    NonZeroExit,
    Timeout,
    Error,
}

impl ExecutionOutcome {
    fn is_failure(self) -> bool {
        !matches!(self, ExecutionOutcome::Success)
    }
}

/// The new state to apply after an execution attempt, as computed by [`decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: JobState,
    pub attempts: i64,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Pure scheduler policy: given the attempt count *before* this execution, the
/// configured retry budget, and the outcome of this attempt, compute the job's next
/// state. Takes no IO and is fully deterministic given `now`.
pub fn decide(
    attempts: i64,
    max_retries: i64,
    outcome: ExecutionOutcome,
    cfg: &QueueConfig,
    now: DateTime<Utc>,
) -> Transition {
    if !outcome.is_failure() {
        return Transition {
            state: JobState::Completed,
            attempts,
            next_retry_at: None,
        };
    }

    let next_attempts = attempts + 1;
    if next_attempts >= max_retries {
        return Transition {
            state: JobState::Dead,
            attempts: next_attempts,
            next_retry_at: None,
        };
    }

    let delay_seconds = backoff_delay_seconds(cfg.backoff_base(), next_attempts, cfg.backoff_cap_seconds());
    Transition {
        state: JobState::Failed,
        attempts: next_attempts,
        next_retry_at: Some(now + chrono::Duration::seconds(delay_seconds)),
    }
}

fn backoff_delay_seconds(base: i64, attempts: i64, cap: i64) -> i64 {
    let exponent = attempts.max(0) as u32;
    base.saturating_pow(exponent).min(cap)
}
