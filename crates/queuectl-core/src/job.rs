use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The unit of work. See crate docs for invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub command: String,
    pub state: JobState,
    pub attempts: i64,
    pub max_retries: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub run_at: Option<DateTime<Utc>>,
    pub timeout: Option<i64>,
    pub output: Option<String>,
}

/// Job lifecycle state. `pending`/`completed`/`dead` never carry a lock;
/// `processing` always does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Failed,
    Completed,
    Dead,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Failed => "failed",
            JobState::Completed => "completed",
            JobState::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobState::Pending),
            "processing" => Some(JobState::Processing),
            "failed" => Some(JobState::Failed),
            "completed" => Some(JobState::Completed),
            "dead" => Some(JobState::Dead),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Job {
    /// Construct a new `pending` job, ready for [`JobStore::add`](crate::JobStore::add).
    pub fn new(
        id: impl Into<String>,
        command: impl Into<String>,
        max_retries: i64,
        run_at: Option<DateTime<Utc>>,
        timeout: Option<i64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            state: JobState::Pending,
            attempts: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            locked_by: None,
            locked_at: None,
            next_retry_at: None,
            run_at,
            timeout,
            output: None,
        }
    }

    /// True iff this job may legally be claimed at `now` (mirrors the Store's claim
    /// predicate; useful for in-memory stores and assertions).
    pub fn is_eligible(&self, now: DateTime<Utc>, stale_lock_seconds: i64) -> bool {
        let state_ok = matches!(self.state, JobState::Pending | JobState::Failed);
        let lock_ok = match (self.locked_by.as_ref(), self.locked_at) {
            (None, _) => true,
            (Some(_), Some(locked_at)) => {
                now - locked_at > chrono::Duration::seconds(stale_lock_seconds)
            }
            (Some(_), None) => true,
        };
        let retry_ok = self.next_retry_at.map_or(true, |t| t <= now);
        let run_ok = self.run_at.map_or(true, |t| t <= now);
        state_ok && lock_ok && retry_ok && run_ok
    }
}
