//! Pacing policy for the settlement worker.
//!
//! Two delays govern a batch: a fixed backoff after a retryable adapter
//! failure, and a throttle between consecutive items that bounds the
//! external call rate. Delays are fixed, never exponential; retried ids
//! re-enter the queue and wait for a later batch, so attempt counts are
//! not tracked across batches.

use std::time::Duration;

/// Fixed delays applied during batch processing.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Pause after a retryable failure, before moving to the next item
    pub retry_delay: Duration,
    /// Pause between consecutive items regardless of outcome
    pub throttle: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(2_000),
            throttle: Duration::from_millis(250),
        }
    }
}

impl BackoffPolicy {
    pub fn new(retry_delay: Duration, throttle: Duration) -> Self {
        Self {
            retry_delay,
            throttle,
        }
    }

    /// Zero delays, for tests and in-memory runs.
    pub fn none() -> Self {
        Self {
            retry_delay: Duration::ZERO,
            throttle: Duration::ZERO,
        }
    }

    /// Set the retry delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the throttle delay
    pub fn with_throttle(mut self, delay: Duration) -> Self {
        self.throttle = delay;
        self
    }

    /// Sleep out the retry backoff after a retryable failure.
    pub async fn after_retryable(&self) {
        if !self.retry_delay.is_zero() {
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    /// Sleep out the inter-item throttle.
    pub async fn between_items(&self) {
        if !self.throttle.is_zero() {
            tokio::time::sleep(self.throttle).await;
        }
    }
}
