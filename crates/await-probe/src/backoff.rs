//! Retry pacing between failed probes.
//!
//! A [`BackoffPolicy`] is the shared, immutable configuration. Every
//! checker calls [`BackoffPolicy::start`] to get its own [`Backoff`], so
//! targets pace their retries independently.

use std::time::Duration;

use tracing::warn;

/// Default wait between probes.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Default ceiling for exponential backoff.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(300);

/// Retry configuration shared by all checkers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
    enabled: bool,
}

impl BackoffPolicy {
    /// Build a policy, clamping `initial` down to `max` when it exceeds it.
    pub fn new(initial: Duration, max: Duration, enabled: bool) -> Self {
        let initial = if initial > max {
            warn!(
                retry_interval = ?initial,
                max_interval = ?max,
                "retry interval exceeds maximum backoff retry interval, using the maximum"
            );
            max
        } else {
            initial
        };
        Self {
            initial,
            max,
            enabled,
        }
    }

    /// Constant interval, no doubling.
    pub fn fixed(interval: Duration) -> Self {
        Self::new(interval, interval.max(DEFAULT_MAX_INTERVAL), false)
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Fresh per-checker state.
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: *self,
            current: self.initial,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_INTERVAL, DEFAULT_MAX_INTERVAL, false)
    }
}

/// Backoff state owned by one checker.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
}

impl Backoff {
    /// Interval to sleep after a failed probe.
    ///
    /// Returns the current interval; when backoff is enabled the doubling
    /// applies to the following call.
    pub fn next_interval(&mut self) -> Duration {
        let wait = self.current;
        if self.policy.enabled {
            self.current = self.current.saturating_mul(2).min(self.policy.max);
        }
        wait
    }

    /// Interval the next failure will wait.
    pub fn current(&self) -> Duration {
        self.current
    }
}
