use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queuectl_core::{Job, JobState, JobStore, QueueError, Result};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// An in-memory [`JobStore`], used by the worker/pool test suites and available to
/// embedding applications that want to exercise `queuectl-worker` without a database.
///
/// Implements the same claim/update semantics as `queuectl-store-sqlite`: eligibility
/// predicate, pending-before-failed/created_at ordering, and a conditional update that
/// checks `locked_by`.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job directly, bypassing `add`'s duplicate check. Used to set up
    /// scenarios such as a pre-existing stale lock from a crashed worker.
    pub async fn seed(&self, job: Job) {
        self.jobs.lock().await.insert(job.id.clone(), job);
    }

    /// Stale-lock threshold used by [`JobStore::claim`] on this store.
    const STALE_LOCK_SECONDS: i64 = 300;
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn add(&self, job: Job) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.id) {
            return Err(QueueError::AlreadyExists(job.id));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn claim(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>> {
        let mut jobs = self.jobs.lock().await;

        let mut candidate_id: Option<String> = None;
        let mut best_rank: Option<(u8, DateTime<Utc>)> = None;
        for job in jobs.values() {
            if !job.is_eligible(now, Self::STALE_LOCK_SECONDS) {
                continue;
            }
            let rank = match job.state {
                JobState::Pending => 0u8,
                JobState::Failed => 1u8,
                _ => continue,
            };
            let key = (rank, job.created_at);
            let better = match best_rank {
                None => true,
                Some(b) => key < b,
            };
            if better {
                best_rank = Some(key);
                candidate_id = Some(job.id.clone());
            }
        }

        let Some(id) = candidate_id else {
            return Ok(None);
        };

        let job = jobs.get_mut(&id).expect("candidate id came from this map");
        job.state = JobState::Processing;
        job.locked_by = Some(worker_id.to_string());
        job.locked_at = Some(now);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn update(&self, claimed_by: &str, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let Some(existing) = jobs.get(&job.id) else {
            return Err(QueueError::NotFound(job.id.clone()));
        };
        if existing.locked_by.as_deref() != Some(claimed_by) {
            // The lock moved to another worker (stale-lock rescue) while this
            // caller was still executing; drop the stale write instead of
            // trampling the rescuing worker's state.
            return Ok(());
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().await;
        Ok(jobs
            .values()
            .filter(|j| state.map_or(true, |s| j.state == s))
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<Vec<(JobState, i64)>> {
        let jobs = self.jobs.lock().await;
        let mut counts: HashMap<JobState, i64> = HashMap::new();
        for job in jobs.values() {
            *counts.entry(job.state).or_insert(0) += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn requeue(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(id).ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        if job.state != JobState::Dead {
            return Err(QueueError::InvalidState {
                id: id.to_string(),
                state: job.state.to_string(),
            });
        }
        job.state = JobState::Pending;
        job.attempts = 0;
        job.locked_by = None;
        job.locked_at = None;
        job.next_retry_at = None;
        job.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuectl_core::Job;

    fn job(id: &str, now: DateTime<Utc>) -> Job {
        Job::new(id, "echo hi", 3, None, None, now)
    }

    #[tokio::test]
    async fn add_then_list_round_trips_exact_fields() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();
        let j = job("r1", now);
        store.add(j.clone()).await.unwrap();

        let listed = store.list(Some(JobState::Pending)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], j);
    }

    #[tokio::test]
    async fn duplicate_add_fails() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();
        store.add(job("dup", now)).await.unwrap();
        let err = store.add(job("dup", now)).await.unwrap_err();
        assert!(matches!(err, QueueError::AlreadyExists(id) if id == "dup"));
    }

    #[tokio::test]
    async fn claim_prefers_pending_over_failed_then_created_at() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();

        let mut failed = job("failed-older", now - chrono::Duration::seconds(10));
        failed.state = JobState::Failed;
        store.seed(failed).await;

        let pending = job("pending-newer", now);
        store.add(pending).await.unwrap();

        let claimed = store.claim("w1", now).await.unwrap().unwrap();
        assert_eq!(claimed.id, "pending-newer");
    }

    #[tokio::test]
    async fn stale_lock_is_reclaimable() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();
        let mut stuck = job("stuck", now - chrono::Duration::minutes(10));
        stuck.state = JobState::Processing;
        stuck.locked_by = Some("dead-worker".to_string());
        stuck.locked_at = Some(now - chrono::Duration::minutes(10));
        store.seed(stuck).await;

        let claimed = store.claim("rescuer", now).await.unwrap();
        assert!(claimed.is_some());
        assert_eq!(claimed.unwrap().locked_by.as_deref(), Some("rescuer"));
    }

    #[tokio::test]
    async fn future_run_at_is_not_claimable() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();
        let mut scheduled = job("scheduled", now);
        scheduled.run_at = Some(now + chrono::Duration::hours(1));
        store.add(scheduled).await.unwrap();

        assert!(store.claim("w1", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_rejects_writes_from_a_worker_that_no_longer_holds_the_lock() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();
        store.add(job("contested", now)).await.unwrap();
        let claimed = store.claim("w1", now).await.unwrap().unwrap();

        // Simulate a rescue-claim by another worker after a stale-lock window.
        let mut rescued = claimed.clone();
        rescued.locked_by = Some("w2".to_string());
        store.update("w2", &rescued).await.unwrap();

        // w1's write should not clobber w2's lock: it no longer matches claimed_by.
        let mut stale_write = claimed;
        stale_write.state = JobState::Completed;
        stale_write.locked_by = None;
        stale_write.locked_at = None;
        store.update("w1", &stale_write).await.unwrap();

        let current = store.list(None).await.unwrap();
        assert_eq!(current[0].locked_by.as_deref(), Some("w2"));
    }

    #[tokio::test]
    async fn requeue_resets_dead_job() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();
        let mut dead = job("dlq1", now);
        dead.state = JobState::Dead;
        dead.attempts = 3;
        store.seed(dead).await;

        let requeued_at = now + chrono::Duration::seconds(5);
        store.requeue("dlq1", requeued_at).await.unwrap();
        let job = store.list(None).await.unwrap().into_iter().next().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.updated_at, requeued_at);
    }

    #[tokio::test]
    async fn requeue_non_dead_job_is_invalid_state() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();
        store.add(job("alive", now)).await.unwrap();
        let err = store.requeue("alive", now).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidState { .. }));
    }
}
