use chrono::{DateTime, Utc};

/// Injectable wall-clock source. Production code uses [`SystemClock`]; tests use
/// `queuectl-testing`'s `ManualClock` to assert on exact backoff/stale-lock boundaries
/// without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock, backed by `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
