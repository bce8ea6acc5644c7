use chrono::{DateTime, Utc};
use queuectl_core::Clock;
use std::sync::Mutex;

/// A [`Clock`] whose value is set explicitly by the test, so backoff and
/// stale-lock boundary assertions don't need real sleeps.
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.current.lock().unwrap();
        *guard = *guard + delta;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.current.lock().unwrap() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap()
    }
}
