use std::collections::HashMap;
use std::env;

/// Read-through configuration for the five keys the core consumes. Resolution order is
/// explicit map entries, then `QUEUECTL_*` environment variables, then the documented
/// default. There is no on-disk persistence here: writing config back to disk is the
/// CLI collaborator's job, out of scope for this crate.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    overrides: HashMap<String, String>,
}

const MAX_RETRIES_KEY: &str = "max_retries";
const BACKOFF_BASE_KEY: &str = "backoff_base";
const WORKER_COUNT_KEY: &str = "worker_count";
const STALE_LOCK_SECONDS_KEY: &str = "stale_lock_seconds";
const POLL_INTERVAL_MS_KEY: &str = "poll_interval_ms";

const DEFAULT_MAX_RETRIES: i64 = 3;
const DEFAULT_BACKOFF_BASE: i64 = 2;
const DEFAULT_WORKER_COUNT: i64 = 1;
const DEFAULT_STALE_LOCK_SECONDS: i64 = 300;
const DEFAULT_POLL_INTERVAL_MS: i64 = 1000;

/// Cap on retry-delay growth (`backoff_base ^ attempts`). Unbounded exponential
/// backoff eventually schedules retries days or weeks out; capping keeps a DLQ-bound
/// job retrying at a sane cadence instead.
pub const DEFAULT_BACKOFF_CAP_SECONDS: i64 = 3600;

impl Default for QueueConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl QueueConfig {
    /// Build a config that reads only from environment variables and defaults.
    pub fn from_env() -> Self {
        Self {
            overrides: HashMap::new(),
        }
    }

    /// Build a config from an explicit map, taking precedence over the environment.
    /// Intended for embedding applications and tests.
    pub fn from_map(overrides: HashMap<String, String>) -> Self {
        Self { overrides }
    }

    fn resolve(&self, key: &str) -> Option<String> {
        if let Some(v) = self.overrides.get(key) {
            return Some(v.clone());
        }
        let env_key = format!("QUEUECTL_{}", key.to_uppercase());
        env::var(env_key).ok()
    }

    fn resolve_i64(&self, key: &str, default: i64) -> i64 {
        self.resolve(key)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(default)
    }

    pub fn max_retries(&self) -> i64 {
        self.resolve_i64(MAX_RETRIES_KEY, DEFAULT_MAX_RETRIES)
    }

    pub fn backoff_base(&self) -> i64 {
        self.resolve_i64(BACKOFF_BASE_KEY, DEFAULT_BACKOFF_BASE)
    }

    pub fn worker_count(&self) -> i64 {
        self.resolve_i64(WORKER_COUNT_KEY, DEFAULT_WORKER_COUNT)
    }

    pub fn stale_lock_seconds(&self) -> i64 {
        self.resolve_i64(STALE_LOCK_SECONDS_KEY, DEFAULT_STALE_LOCK_SECONDS)
    }

    pub fn poll_interval_ms(&self) -> i64 {
        self.resolve_i64(POLL_INTERVAL_MS_KEY, DEFAULT_POLL_INTERVAL_MS)
    }

    /// Not one of the five overridable keys; a fixed cap, not user-configurable.
    pub fn backoff_cap_seconds(&self) -> i64 {
        DEFAULT_BACKOFF_CAP_SECONDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = QueueConfig::from_map(HashMap::new());
        assert_eq!(cfg.max_retries(), 3);
        assert_eq!(cfg.backoff_base(), 2);
        assert_eq!(cfg.worker_count(), 1);
        assert_eq!(cfg.stale_lock_seconds(), 300);
        assert_eq!(cfg.poll_interval_ms(), 1000);
    }

    #[test]
    fn explicit_map_overrides_defaults() {
        let mut overrides = HashMap::new();
        overrides.insert("max_retries".to_string(), "7".to_string());
        let cfg = QueueConfig::from_map(overrides);
        assert_eq!(cfg.max_retries(), 7);
        assert_eq!(cfg.backoff_base(), 2);
    }
}
