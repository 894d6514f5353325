//! Readiness polling
//!
//! Repeatedly performs one observation against an external system until it
//! reports ready, reports an unrecoverable condition, or the deadline passes.
//! Elapsed time is measured from the start of the poll on the runtime clock,
//! so the latency of each check counts toward the timeout.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{Error, Result};

/// Result of a single readiness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    NotYetReady,
    Unrecoverable(String),
}

impl PollOutcome {
    pub fn unrecoverable(reason: impl Into<String>) -> Self {
        PollOutcome::Unrecoverable(reason.into())
    }

    pub fn from_bool(ready: bool) -> Self {
        if ready {
            PollOutcome::Ready
        } else {
            PollOutcome::NotYetReady
        }
    }
}

/// Result of a complete poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready { checks: u32, elapsed: Duration },
    TimedOut { checks: u32, elapsed: Duration },
    Unrecoverable { reason: String, checks: u32, elapsed: Duration },
}

impl WaitOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready { .. })
    }

    /// Number of times the check was invoked
    pub fn checks(&self) -> u32 {
        match self {
            WaitOutcome::Ready { checks, .. }
            | WaitOutcome::TimedOut { checks, .. }
            | WaitOutcome::Unrecoverable { checks, .. } => *checks,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            WaitOutcome::Ready { elapsed, .. }
            | WaitOutcome::TimedOut { elapsed, .. }
            | WaitOutcome::Unrecoverable { elapsed, .. } => *elapsed,
        }
    }

    /// Convert into a `Result`, naming the awaited condition in the error.
    ///
    /// A timeout means the environment was slow; an unrecoverable outcome
    /// means the caller cannot continue without outside action.
    pub fn into_result(self, what: &str) -> Result<Duration> {
        match self {
            WaitOutcome::Ready { elapsed, .. } => Ok(elapsed),
            WaitOutcome::TimedOut { elapsed, .. } => Err(Error::Timeout {
                what: what.to_string(),
                seconds: elapsed.as_secs(),
            }),
            WaitOutcome::Unrecoverable { reason, .. } => Err(Error::Unrecoverable {
                what: what.to_string(),
                reason,
            }),
        }
    }
}

/// Poll `check` until it is ready, unrecoverable, or `timeout` has elapsed.
///
/// The first check runs immediately. Between checks the poller sleeps for
/// `interval`, clamped to the remaining budget.
pub async fn poll_until_ready<F, Fut>(mut check: F, timeout: Duration, interval: Duration) -> WaitOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollOutcome>,
{
    let start = Instant::now();
    let mut checks = 0u32;

    loop {
        checks += 1;
        match check().await {
            PollOutcome::Ready => {
                return WaitOutcome::Ready {
                    checks,
                    elapsed: start.elapsed(),
                };
            }
            PollOutcome::Unrecoverable(reason) => {
                debug!(checks, %reason, "poll aborted");
                return WaitOutcome::Unrecoverable {
                    reason,
                    checks,
                    elapsed: start.elapsed(),
                };
            }
            PollOutcome::NotYetReady => {}
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            debug!(checks, ?elapsed, "poll timed out");
            return WaitOutcome::TimedOut { checks, elapsed };
        }

        sleep(interval.min(timeout - elapsed)).await;
    }
}

/// A named polling policy composed explicitly at each call site
#[derive(Debug, Clone)]
pub struct Poller {
    pub label: String,
    pub timeout: Duration,
    pub interval: Duration,
}

impl Poller {
    pub fn new(label: impl Into<String>, timeout: Duration, interval: Duration) -> Self {
        Self {
            label: label.into(),
            timeout,
            interval,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn wait<F, Fut>(&self, check: F) -> WaitOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PollOutcome>,
    {
        debug!(label = %self.label, timeout = ?self.timeout, "waiting");
        poll_until_ready(check, self.timeout, self.interval).await
    }

    /// Wait and convert the outcome into a `Result` labelled with this poller
    pub async fn wait_ready<F, Fut>(&self, check: F) -> Result<Duration>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PollOutcome>,
    {
        self.wait(check).await.into_result(&self.label)
    }
}
