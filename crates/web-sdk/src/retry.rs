//! Bounded retry: poll at a fixed interval, stop on the first success or after
//! a fixed number of attempts.

use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Succeeded { attempts: u32 },
    GaveUp { attempts: u32 },
}

impl RetryOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }
}

impl RetryPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Enough attempts to cover `timeout` at `interval` spacing.
    pub fn from_timeout(interval: Duration, timeout: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let attempts = timeout.as_millis().div_ceil(interval_ms);
        Self::new(interval, u32::try_from(attempts).unwrap_or(u32::MAX))
    }

    /// Window covered by all attempts.
    pub fn window(&self) -> Duration {
        self.interval * self.max_attempts
    }

    /// Wait one interval before each attempt; stop as soon as `attempt`
    /// returns true.
    pub async fn run<F>(&self, mut attempt: F) -> RetryOutcome
    where
        F: FnMut() -> bool,
    {
        for n in 1..=self.max_attempts {
            tokio::time::sleep(self.interval).await;
            if attempt() {
                return RetryOutcome::Succeeded { attempts: n };
            }
            debug!(attempt = n, max_attempts = self.max_attempts, "retry attempt failed");
        }
        RetryOutcome::GaveUp {
            attempts: self.max_attempts,
        }
    }
}
