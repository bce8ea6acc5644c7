use std::sync::Arc;
use std::time::Duration;

use queuectl_core::{Clock, JobStore, QueueConfig};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use crate::worker::Worker;

/// Bounded deadline for a single worker to join after `stop` before the pool gives
/// up waiting on it.
const JOIN_DEADLINE: Duration = Duration::from_secs(5);

struct Spawned {
    worker: Arc<Worker>,
    task: JoinHandle<()>,
}

/// Supervises `N` [`Worker`]s sharing one [`JobStore`]. `shell_mode` is fixed for
/// the lifetime of one `start` call; mixing modes across restarts (stop, then
/// start again with a different `shell_mode`) is permitted.
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    config: QueueConfig,
    workers: Mutex<Vec<Spawned>>,
}

impl WorkerPool {
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>, config: QueueConfig) -> Self {
        Self {
            store,
            clock,
            config,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn `count` workers as independent Tokio tasks.
    pub async fn start(&self, count: usize, shell_mode: bool) {
        let mut workers = self.workers.lock().await;
        for _ in 0..count {
            let worker_id = format!("worker-{}", Uuid::new_v4());
            let worker = Arc::new(Worker::new(
                worker_id,
                self.store.clone(),
                self.clock.clone(),
                self.config.clone(),
                shell_mode,
            ));
            let run_handle = worker.clone();
            let task = tokio::spawn(async move { run_handle.run().await });
            workers.push(Spawned { worker, task });
        }
    }

    /// Signal all workers to stop, cancel any in-flight children, and join each
    /// within [`JOIN_DEADLINE`]. Idempotent: calling `stop` with no workers running
    /// is a no-op.
    pub async fn stop(&self) {
        let spawned: Vec<Spawned> = {
            let mut workers = self.workers.lock().await;
            workers.drain(..).collect()
        };

        for s in &spawned {
            s.worker.stop();
        }

        for s in spawned {
            if tokio::time::timeout(JOIN_DEADLINE, s.task).await.is_err() {
                warn!(
                    worker_id = %s.worker.worker_id(),
                    "worker did not join within the shutdown deadline"
                );
            }
        }
    }

    /// Number of workers currently spawned (not yet joined via `stop`).
    pub async fn active_count(&self) -> usize {
        self.workers.lock().await.len()
    }
}
