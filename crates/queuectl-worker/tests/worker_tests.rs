use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use queuectl_core::{Clock, Job, JobState, JobStore, QueueConfig, SystemClock};
use queuectl_testing::{InMemoryJobStore, ManualClock};
use queuectl_worker::{Worker, WorkerPool};

fn config(overrides: &[(&str, &str)]) -> QueueConfig {
    let map: HashMap<String, String> = overrides
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    QueueConfig::from_map(map)
}

/// Scenario 1: happy path.
#[tokio::test]
async fn happy_path_echo_completes() {
    let store = Arc::new(InMemoryJobStore::new());
    let now = Utc::now();
    store
        .add(Job::new("happy", "echo hello", 3, None, None, now))
        .await
        .unwrap();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let worker = Worker::new("w1", store.clone(), clock, config(&[]), true);

    tokio::time::timeout(Duration::from_secs(5), async { worker.process_once().await })
        .await
        .expect("job should resolve within 5s");

    let jobs = store.list(None).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].state, JobState::Completed);
    assert_eq!(jobs[0].attempts, 0);
    assert!(jobs[0].output.as_deref().unwrap().contains("hello"));
    assert!(jobs[0].locked_by.is_none());
}

/// Scenario 2: retry then dead.
#[tokio::test]
async fn invalid_command_retries_then_goes_dead() {
    let store = Arc::new(InMemoryJobStore::new());
    let now = Utc::now();
    store
        .add(Job::new(
            "retry-then-dead",
            "definitely_not_a_real_binary_xyz",
            2,
            None,
            None,
            now,
        ))
        .await
        .unwrap();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let worker = Worker::new("w1", store.clone(), clock, config(&[]), false);

    assert!(worker.process_once().await);
    let job = store.list(None).await.unwrap().into_iter().next().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 1);
    assert!(job.next_retry_at.is_some());

    // Pull the scheduled retry into the past so the second attempt is claimable now.
    let mut eligible = job.clone();
    eligible.next_retry_at = Some(Utc::now() - chrono::Duration::seconds(1));
    store.seed(eligible).await;

    assert!(worker.process_once().await);
    let job = store.list(None).await.unwrap().into_iter().next().unwrap();
    assert_eq!(job.state, JobState::Dead);
    assert_eq!(job.attempts, 2);
}

/// Scenario 3: scheduled job is not claimed before its time.
#[tokio::test]
async fn scheduled_job_is_not_claimed_early() {
    let store = InMemoryJobStore::new();
    let now = Utc::now();
    let run_at = now + chrono::Duration::hours(1);
    store
        .add(Job::new("scheduled", "echo later", 3, Some(run_at), None, now))
        .await
        .unwrap();

    assert!(store.claim("w1", now).await.unwrap().is_none());
    let listed = store.list(None).await.unwrap();
    assert_eq!(listed[0].state, JobState::Pending);
    assert_eq!(listed[0].run_at, Some(run_at));
}

/// Scenario 4: timeout with max_retries=1 goes straight to dead.
#[tokio::test]
async fn timeout_with_single_retry_budget_goes_dead() {
    let store = Arc::new(InMemoryJobStore::new());
    let now = Utc::now();
    let job = Job::new("timeout-job", "sleep 10", 1, None, Some(1), now);
    store.add(job).await.unwrap();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let worker = Worker::new("w1", store.clone(), clock, config(&[]), true);

    tokio::time::timeout(Duration::from_secs(3), async { worker.process_once().await })
        .await
        .expect("single attempt should resolve within 3s");

    let job = store.list(None).await.unwrap().into_iter().next().unwrap();
    assert_eq!(job.state, JobState::Dead);
    assert!(job.output.as_deref().unwrap().to_lowercase().contains("timeout"));
}

/// Scenario 5: pool throughput - three jobs, two workers, all complete, none locked.
#[tokio::test]
async fn pool_of_two_completes_three_jobs() {
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let now = Utc::now();
    for i in 0..3 {
        store
            .add(Job::new(format!("job{i}"), format!("echo job{i}"), 1, None, None, now))
            .await
            .unwrap();
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let pool = WorkerPool::new(store.clone(), clock, config(&[]));
    pool.start(2, true).await;
    assert_eq!(pool.active_count().await, 2);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let completed = store.list(Some(JobState::Completed)).await.unwrap();
        if completed.len() == 3 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "jobs did not complete in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    pool.stop().await;
    let all = store.list(None).await.unwrap();
    assert!(all.iter().all(|j| j.locked_by.is_none()));
    assert!(all.iter().all(|j| j.state == JobState::Completed));
}

/// Scenario 6: stale lock recovery.
#[tokio::test]
async fn stale_lock_is_reclaimed_and_processed() {
    let store = Arc::new(InMemoryJobStore::new());
    let now = Utc::now();
    let mut stuck = Job::new(
        "stuck",
        "echo rescued",
        3,
        None,
        None,
        now - chrono::Duration::minutes(10),
    );
    stuck.state = JobState::Processing;
    stuck.locked_by = Some("dead-worker".to_string());
    stuck.locked_at = Some(now - chrono::Duration::minutes(10));
    store.seed(stuck).await;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let worker = Worker::new("rescuer", store.clone(), clock, config(&[]), true);

    tokio::time::timeout(Duration::from_secs(2), async { worker.process_once().await })
        .await
        .expect("rescue claim should resolve quickly");

    let job = store.list(None).await.unwrap().into_iter().next().unwrap();
    assert_eq!(job.state, JobState::Completed);
}

/// B1: a failed job's backoff window expires and it becomes claimable, driven
/// entirely by a manual clock rather than real sleeping.
#[tokio::test]
async fn backoff_expiry_is_driven_by_manual_clock_not_real_time() {
    let store = Arc::new(InMemoryJobStore::new());
    let start = Utc::now();
    let mut job = Job::new("backoff", "echo recovered", 3, None, None, start);
    job.state = JobState::Failed;
    job.attempts = 1;
    job.next_retry_at = Some(start + chrono::Duration::seconds(30));
    store.seed(job).await;

    let clock = Arc::new(ManualClock::new(start));
    let worker = Worker::new("w1", store.clone(), clock.clone(), config(&[]), true);

    // Still inside the backoff window: nothing eligible yet.
    assert!(!worker.process_once().await);
    let job = store.list(None).await.unwrap().into_iter().next().unwrap();
    assert_eq!(job.state, JobState::Failed);

    // Jump the clock past next_retry_at without waiting for it.
    clock.advance(chrono::Duration::seconds(31));
    assert!(worker.process_once().await);

    let job = store.list(None).await.unwrap().into_iter().next().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts, 2);
}

/// R3: Stop is idempotent; Stop then Start(n) restores ActiveCount()=n.
#[tokio::test]
async fn stop_is_idempotent_and_restart_restores_active_count() {
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let pool = WorkerPool::new(store, clock, config(&[]));

    pool.start(3, true).await;
    assert_eq!(pool.active_count().await, 3);

    pool.stop().await;
    assert_eq!(pool.active_count().await, 0);
    pool.stop().await; // idempotent
    assert_eq!(pool.active_count().await, 0);

    pool.start(3, true).await;
    assert_eq!(pool.active_count().await, 3);
    pool.stop().await;
}
