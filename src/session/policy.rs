//! Reconnection policy
//!
//! A fixed number of retries at a fixed spacing. No backoff, no jitter: the
//! budget is small enough that neither buys anything.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Retries allowed after the signaling channel closes
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Delay before each retry
pub const RECONNECT_DELAY: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            delay: RECONNECT_DELAY,
        }
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: Duration::from_millis(config.delay_ms),
        }
    }
}

/// Retry counter governed by a [`ReconnectPolicy`]
#[derive(Debug, Clone)]
pub struct RetryBudget {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl RetryBudget {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempts: 0 }
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Retries consumed since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Called when a channel opens successfully
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consume one retry. Returns the 1-based retry number, or `None` once
    /// the budget is spent.
    pub fn next_attempt(&mut self) -> Option<u32> {
        if self.attempts < self.policy.max_attempts {
            self.attempts += 1;
            Some(self.attempts)
        } else {
            None
        }
    }
}
