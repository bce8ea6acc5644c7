use chrono::{DateTime, Utc};

/// Optional overrides for [`crate::Queue::enqueue`]. Everything defaults to "let
/// the queue decide": a generated id, the queue's configured default retry
/// budget, immediate eligibility, and no per-job timeout.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub(crate) id: Option<String>,
    pub(crate) max_retries: Option<i64>,
    pub(crate) run_at: Option<DateTime<Utc>>,
    pub(crate) timeout: Option<i64>,
}

impl EnqueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn max_retries(mut self, max_retries: i64) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Defer eligibility until `at`; the job will not be claimed before then.
    pub fn run_at(mut self, at: DateTime<Utc>) -> Self {
        self.run_at = Some(at);
        self
    }

    pub fn timeout(mut self, seconds: i64) -> Self {
        self.timeout = Some(seconds);
        self
    }
}
