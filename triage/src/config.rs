//! Scheduler configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::RetryConfig;

/// Tunables for the scheduling loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Concurrency budget: maximum simultaneously running tasks.
    pub workers: usize,
    /// How long the loop sleeps when nothing was dispatched, in milliseconds.
    pub poll_interval_ms: u64,
    /// Admission passes a missing-sample task survives before failing.
    pub max_requeue_attempts: u32,
    /// Retry policy for terminal persistence.
    pub persistence_retry: RetryConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval_ms: 100,
            max_requeue_attempts: 3,
            persistence_retry: RetryConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concurrency budget.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the idle poll interval.
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, interval: u64) -> Self {
        self.poll_interval_ms = interval;
        self
    }

    /// Sets the missing-sample requeue bound.
    #[must_use]
    pub const fn with_max_requeue_attempts(mut self, attempts: u32) -> Self {
        self.max_requeue_attempts = attempts;
        self
    }

    /// Sets the persistence retry policy.
    #[must_use]
    pub fn with_persistence_retry(mut self, retry: RetryConfig) -> Self {
        self.persistence_retry = retry;
        self
    }

    /// The idle poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.max_requeue_attempts, 3);
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_builders() {
        let config = SchedulerConfig::new()
            .with_workers(2)
            .with_poll_interval_ms(10)
            .with_max_requeue_attempts(1);

        assert_eq!(config.workers, 2);
        assert_eq!(config.poll_interval_ms, 10);
        assert_eq!(config.max_requeue_attempts, 1);
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = SchedulerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: SchedulerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
