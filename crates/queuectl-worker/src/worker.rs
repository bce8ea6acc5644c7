use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use queuectl_core::{decide, Clock, ExecutionOutcome, Job, JobState, JobStore, QueueConfig};
use queuectl_exec::{format_error_output, ExecError, Executor};
use tracing::{debug, error, info, warn};

/// One execution context: claims jobs from the shared [`JobStore`], runs them
/// through an [`Executor`], and writes the next state back via the scheduler
/// policy. Jobs are processed one at a time, sequentially, within a Worker.
pub struct Worker {
    worker_id: String,
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    config: QueueConfig,
    shell_mode: bool,
    executor: Executor,
    running: AtomicBool,
}

impl Worker {
    pub fn new(
        worker_id: impl Into<String>,
        store: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
        config: QueueConfig,
        shell_mode: bool,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            store,
            clock,
            config,
            shell_mode,
            executor: Executor::new(),
            running: AtomicBool::new(true),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run the claim/execute/transition loop until [`Worker::stop`] is called.
    /// Intended to be spawned as its own Tokio task by [`crate::WorkerPool`].
    pub async fn run(&self) {
        while self.running.load(Ordering::SeqCst) {
            if !self.process_once().await {
                self.sleep_poll_interval().await;
            }
        }
    }

    /// Claim and, if one was available, execute a single job. Returns whether a
    /// job was claimed. Exposed directly so callers can drive a worker one step
    /// at a time without spawning the full `run` loop.
    pub async fn process_once(&self) -> bool {
        let now = self.clock.now();
        match self.store.claim(&self.worker_id, now).await {
            Ok(Some(job)) => {
                self.process(job).await;
                true
            }
            Ok(None) => {
                debug!(worker_id = %self.worker_id, "no eligible job, polling");
                false
            }
            Err(e) => {
                error!(worker_id = %self.worker_id, error = %e, "claim failed unexpectedly");
                false
            }
        }
    }

    /// Signal this worker to stop after its current iteration, and cancel any
    /// in-flight child process. A worker must not claim a new job once this has
    /// been called.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.executor.cancel();
    }

    async fn sleep_poll_interval(&self) {
        let ms = self.config.poll_interval_ms().max(0) as u64;
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    async fn process(&self, mut job: Job) {
        // Defensive fallback: Claim's eligibility predicate already excludes
        // future run_at, so this should not trigger in practice.
        if let Some(run_at) = job.run_at {
            let now = self.clock.now();
            if run_at > now {
                warn!(job_id = %job.id, "claimed job scheduled for the future, releasing lock");
                job.state = JobState::Pending;
                job.locked_by = None;
                job.locked_at = None;
                if let Err(e) = self.store.update(&self.worker_id, &job).await {
                    error!(job_id = %job.id, error = %e, "failed to release future-scheduled job");
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
                return;
            }
        }

        debug!(worker_id = %self.worker_id, job_id = %job.id, "executing job");
        let result = self
            .executor
            .run(&job.command, job.timeout, self.shell_mode)
            .await;

        let (outcome, output) = match &result {
            Ok(report) if report.success() => (ExecutionOutcome::Success, report.format_output()),
            Ok(report) => (ExecutionOutcome::NonZeroExit, report.format_output()),
            Err(ExecError::Timeout) => (ExecutionOutcome::Timeout, format_error_output(&ExecError::Timeout)),
            Err(e @ ExecError::Canceled) => (ExecutionOutcome::Error, format_error_output(e)),
            Err(e @ ExecError::Spawn(_)) => (ExecutionOutcome::Error, format_error_output(e)),
        };

        let now = self.clock.now();
        let transition = decide(job.attempts, job.max_retries, outcome, &self.config, now);

        job.state = transition.state;
        job.attempts = transition.attempts;
        job.next_retry_at = transition.next_retry_at;
        job.output = Some(output);
        job.updated_at = now;
        job.locked_by = None;
        job.locked_at = None;

        match self.store.update(&self.worker_id, &job).await {
            Ok(()) => match job.state {
                JobState::Completed => info!(job_id = %job.id, "job completed"),
                JobState::Dead => warn!(job_id = %job.id, attempts = job.attempts, "job moved to dead letter queue"),
                JobState::Failed => info!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    next_retry_at = ?job.next_retry_at,
                    "job failed, retry scheduled"
                ),
                _ => {}
            },
            Err(e) => {
                // The job's lock will eventually be reclaimed as stale; we don't
                // retry the write here.
                error!(job_id = %job.id, error = %e, "failed to persist job transition");
            }
        }
    }
}
