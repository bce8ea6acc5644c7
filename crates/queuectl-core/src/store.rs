use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::job::{Job, JobState};
use crate::Result;

/// Durable, transactional job persistence. A backend implements this trait once;
/// `Worker`/`WorkerPool`/`Queue` depend only on the trait, never the concrete store.
///
/// `Claim` is the sole atomicity boundary: implementations MUST guarantee that two
/// concurrent `claim` calls never return the same row (e.g. `BEGIN IMMEDIATE` +
/// single-row update for SQLite, `FOR UPDATE SKIP LOCKED` for Postgres).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with [`crate::QueueError::AlreadyExists`] on a duplicate id.
    async fn add(&self, job: Job) -> Result<()>;

    /// Atomically select at most one eligible job and transition it to `processing`,
    /// locking it for `worker_id`. Returns `Ok(None)` when nothing is eligible, and
    /// also `Ok(None)` (rather than propagating) on storage I/O errors.
    async fn claim(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>>;

    /// Write back a locked job after processing. `claimed_by` must match the
    /// `worker_id` that is currently holding the job's lock in storage; if it
    /// doesn't (the lock was reclaimed as stale and handed to another worker while
    /// this one was still executing), the write is silently dropped rather than
    /// trampling the rescuing worker's state. `job`'s own `locked_by`/`locked_at`
    /// are ignored for this check — callers pass the post-execution snapshot with
    /// those fields already cleared.
    async fn update(&self, claimed_by: &str, job: &Job) -> Result<()>;

    /// Enumerate jobs, optionally filtered by state.
    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>>;

    /// Count jobs grouped by state.
    async fn stats(&self) -> Result<Vec<(JobState, i64)>>;

    /// Reset a `dead` job back to `pending` with `attempts=0`, stamping
    /// `updated_at = now`. Fails with [`crate::QueueError::NotFound`] if the id
    /// doesn't exist, or [`crate::QueueError::InvalidState`] if it isn't
    /// currently `dead`.
    async fn requeue(&self, id: &str, now: DateTime<Utc>) -> Result<()>;
}
