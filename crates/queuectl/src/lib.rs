//! `queuectl`: the facade tying a [`JobStore`] backend, the scheduler policy, and
//! a [`WorkerPool`] together into the single entry point an embedding application
//! talks to.
//!
//! ```no_run
//! # async fn run() -> queuectl_core::Result<()> {
//! use queuectl::{EnqueueOptions, QueueBuilder};
//!
//! let queue = QueueBuilder::new("sqlite://jobs.db").build().await?;
//! let id = queue.enqueue("echo hello", EnqueueOptions::new()).await?;
//! queue.pool().start(4, true).await;
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

mod options;

pub use options::EnqueueOptions;
pub use queuectl_core::{Clock, Job, JobState, JobStore, QueueConfig, QueueError, Result, SystemClock};
pub use queuectl_worker::WorkerPool;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use queuectl_store_sqlite::SqliteJobStore;
use tracing::{debug, info};
use uuid::Uuid;

/// Builds a [`Queue`] backed by the bundled SQLite store. For a different backend,
/// implement [`JobStore`] and construct a [`Queue`] directly with [`Queue::new`].
pub struct QueueBuilder {
    database_url: String,
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            config: QueueConfig::from_env(),
        }
    }

    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Open (creating if missing) the SQLite database and run its migration.
    pub async fn build(self) -> Result<Queue> {
        let store =
            SqliteJobStore::connect(&self.database_url, self.config.stale_lock_seconds()).await?;
        Ok(Queue::new(Arc::new(store), self.config))
    }
}

/// The durable job queue: enqueue work, inspect it, requeue dead-lettered jobs,
/// and drive a [`WorkerPool`] against it.
pub struct Queue {
    store: Arc<dyn JobStore>,
    config: QueueConfig,
    pool: WorkerPool,
}

impl Queue {
    /// Build a `Queue` over any [`JobStore`] implementation (the bundled SQLite
    /// store, or a test double such as `queuectl_testing::InMemoryJobStore`).
    pub fn new(store: Arc<dyn JobStore>, config: QueueConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let pool = WorkerPool::new(store.clone(), clock, config.clone());
        Self {
            store,
            config,
            pool,
        }
    }

    /// Enqueue a new job. `command` is interpreted by the worker pool's
    /// `shell_mode` setting at execution time, not at enqueue time. Returns the
    /// job's id (generated as a UUID if `options` doesn't set one explicitly).
    pub async fn enqueue(&self, command: impl Into<String>, options: EnqueueOptions) -> Result<String> {
        let id = options.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let max_retries = options.max_retries.unwrap_or_else(|| self.config.max_retries());
        let job = Job::new(
            id.clone(),
            command,
            max_retries,
            options.run_at,
            options.timeout,
            Utc::now(),
        );
        self.store.add(job).await?;
        debug!(job_id = %id, "enqueued job");
        Ok(id)
    }

    /// List jobs, optionally filtered to one lifecycle state.
    pub async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        self.store.list(state).await
    }

    /// Count of jobs per lifecycle state.
    pub async fn stats(&self) -> Result<HashMap<JobState, i64>> {
        Ok(self.store.stats().await?.into_iter().collect())
    }

    /// Move a `dead` job back to `pending` with its attempt counter reset. Fails
    /// with [`QueueError::InvalidState`] if the job isn't currently `dead`.
    pub async fn requeue_from_dlq(&self, id: &str) -> Result<()> {
        self.store.requeue(id, Utc::now()).await?;
        info!(job_id = %id, "requeued job from dead letter queue");
        Ok(())
    }

    /// The worker pool driving this queue's jobs. Starting/stopping it is the
    /// caller's responsibility; a freshly built `Queue` has no workers running.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}
