//! Bounded retry for single UI actions
//!
//! Actions are not rolled back between attempts, so wrapped actions must be
//! idempotent or tolerate being invoked again after a partial failure.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

/// One entry in the history of a retrying call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAttempt {
    /// 1-based attempt index
    pub index: u32,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Result of a retrying call together with its attempt history
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: Vec<ActionAttempt>,
}

/// Attempt count and inter-attempt delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Create a policy; an attempt count of zero is treated as one
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `action` until it succeeds or the attempts are exhausted.
    ///
    /// The last error is returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, label: &str, action: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_recorded(label, action).await.result
    }

    /// Like [`RetryPolicy::run`], also returning the attempt history
    pub async fn run_recorded<T, E, F, Fut>(&self, label: &str, mut action: F) -> RetryOutcome<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut history = Vec::with_capacity(self.attempts as usize);
        let mut index = 1;

        loop {
            match action().await {
                Ok(value) => {
                    debug!(action = label, attempt = index, "action succeeded");
                    history.push(ActionAttempt {
                        index,
                        succeeded: true,
                        error: None,
                    });
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: history,
                    };
                }
                Err(e) => {
                    warn!(
                        action = label,
                        attempt = index,
                        of = self.attempts,
                        "action failed: {}",
                        e
                    );
                    history.push(ActionAttempt {
                        index,
                        succeeded: false,
                        error: Some(e.to_string()),
                    });
                    if index >= self.attempts {
                        return RetryOutcome {
                            result: Err(e),
                            attempts: history,
                        };
                    }
                }
            }

            index += 1;
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
        }
    }
}

/// Run `action` up to `attempts` times with `delay` between attempts
pub async fn with_retry<T, E, F, Fut>(attempts: u32, delay: Duration, action: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    RetryPolicy::new(attempts, delay).run("action", action).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use test_case::test_case;
    use tokio::time::Instant;

    #[test_case(1 ; "single attempt")]
    #[test_case(3 ; "three attempts")]
    #[test_case(7 ; "seven attempts")]
    #[tokio::test(start_paused = true)]
    async fn always_failing_action_runs_exactly_n_times(n: u32) {
        let calls = Cell::new(0u32);

        let result: Result<(), String> = with_retry(n, Duration::from_millis(250), || {
            let call = calls.get() + 1;
            calls.set(call);
            async move { Err(format!("click failed on call {}", call)) }
        })
        .await;

        assert_eq!(calls.get(), n);
        assert_eq!(result.unwrap_err(), format!("click failed on call {}", n));
    }

    #[test_case(1, 4 ; "first attempt")]
    #[test_case(2, 4 ; "second attempt")]
    #[test_case(4, 4 ; "last attempt")]
    #[tokio::test(start_paused = true)]
    async fn stops_after_first_success(k: u32, n: u32) {
        let calls = Cell::new(0u32);

        let outcome = RetryPolicy::new(n, Duration::from_millis(10))
            .run_recorded("select layout", || {
                let call = calls.get() + 1;
                calls.set(call);
                async move {
                    if call >= k {
                        Ok(call)
                    } else {
                        Err("not clickable")
                    }
                }
            })
            .await;

        assert_eq!(outcome.result, Ok(k));
        assert_eq!(calls.get(), k);
        assert_eq!(outcome.attempts.len(), k as usize);
        assert!(outcome.attempts.last().map(|a| a.succeeded).unwrap_or(false));
    }

    #[tokio::test]
    async fn succeeds_on_third_call_without_delay() {
        let calls = Cell::new(0u32);

        let result = with_retry(3, Duration::ZERO, || {
            let call = calls.get() + 1;
            calls.set(call);
            async move {
                if call < 3 {
                    Err(format!("attempt {} failed", call))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_applies_only_between_attempts() {
        let start = Instant::now();
        let result: Result<(), &str> =
            with_retry(3, Duration::from_secs(2), || async { Err("nope") }).await;

        assert!(result.is_err());
        assert_eq!(start.elapsed(), Duration::from_secs(4));

        let start = Instant::now();
        let result: Result<u8, &str> = with_retry(3, Duration::from_secs(2), || async { Ok(1) }).await;
        assert_eq!(result, Ok(1));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn zero_attempts_is_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts(), 1);
    }
}
