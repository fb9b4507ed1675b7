use std::time::Duration;

use serde::Deserialize;

/// Tuning knobs for the save orchestrator.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Window in which repeated saves of one entity collapse into one flush.
    pub debounce_ms: u64,
    /// Upper bound on remote calls in flight across entities.
    pub max_concurrency: usize,
    /// Extra attempts after a transient failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on every further attempt.
    pub retry_backoff_ms: u64,
    /// Deadline for a single remote call.
    pub remote_timeout_ms: u64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            debounce_ms: 40,
            max_concurrency: 4,
            max_retries: 3,
            retry_backoff_ms: 150,
            remote_timeout_ms: 10_000,
        }
    }
}

impl SyncOptions {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}
