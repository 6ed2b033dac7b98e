// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deadline-bounded polling and bounded retry.
//!
//! Every wait in a provisioning run goes through [`poll_until`], which gives up
//! with [`DeadlineExceeded`] once its deadline passes, even when a single probe
//! hangs. Transient remote failures go through [`retry_transient`].

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// How often to probe and how long to keep trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two probes.
    pub interval: Duration,
    /// Total time budget for the wait.
    pub deadline: Duration,
}

impl PollPolicy {
    /// Create a policy from an interval and a deadline.
    pub const fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    /// Create a policy from whole seconds.
    pub const fn from_secs(interval: u64, deadline: u64) -> Self {
        Self::new(
            Duration::from_secs(interval),
            Duration::from_secs(deadline),
        )
    }
}

/// A wait loop ran out of time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{what} not ready after {}s", after.as_secs())]
pub struct DeadlineExceeded {
    /// What was being waited for.
    pub what: &'static str,
    /// The deadline that expired.
    pub after: Duration,
}

/// Probe until `probe` yields a value or the policy's deadline expires.
///
/// The probe runs immediately, then after each `interval`. The whole loop,
/// including a probe that never returns, is bounded by `deadline`.
pub async fn poll_until<T, F, Fut>(
    policy: PollPolicy,
    what: &'static str,
    mut probe: F,
) -> Result<T, DeadlineExceeded>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let started = tokio::time::Instant::now();
    let looped = async {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Some(value) = probe().await {
                debug!(
                    what,
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Readiness reached"
                );
                return value;
            }
            tokio::time::sleep(policy.interval).await;
        }
    };

    tokio::time::timeout(policy.deadline, looped)
        .await
        .map_err(|_| DeadlineExceeded {
            what,
            after: policy.deadline,
        })
}

/// Linear backoff for transient failures.
///
/// After failed attempt `n` (1-indexed) the caller waits `base_delay * n`, so
/// the default policy makes three attempts and waits 2s, 4s, then 6s before
/// giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included. Zero behaves as one.
    pub max_attempts: u32,
    /// Base delay, multiplied by the attempt number.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-indexed).
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// Run `op`, retrying only the errors `is_transient` accepts.
pub async fn retry_transient<T, E, F, Fut>(
    policy: RetryPolicy,
    operation: &'static str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) => {
                let delay = policy.delay_after_attempt(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "Transient failure"
                );
                tokio::time::sleep(delay).await;
                if attempt >= max_attempts {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_once_probe_succeeds() {
        let started = Instant::now();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let value = poll_until(PollPolicy::from_secs(2, 120), "port", move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                (n == 4).then_some(n)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 4);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_fails_at_deadline() {
        let started = Instant::now();

        let err = poll_until(PollPolicy::from_secs(5, 180), "auth", || async {
            None::<()>
        })
        .await
        .unwrap_err();

        assert_eq!(err.what, "auth");
        assert_eq!(err.after, Duration::from_secs(180));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(180));
        assert!(elapsed < Duration::from_secs(181));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_bounds_a_hanging_probe() {
        let started = Instant::now();

        let err = poll_until(PollPolicy::from_secs(2, 30), "health", || {
            futures::future::pending::<Option<()>>()
        })
        .await
        .unwrap_err();

        assert_eq!(err.after, Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(31));
    }

    #[test]
    fn test_linear_backoff_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after_attempt(3), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_three_attempts() {
        let started = Instant::now();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), String> = retry_transient(
            RetryPolicy::default(),
            "exec",
            |_| true,
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("connection reset".to_string())
                }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_last_attempt() {
        let started = Instant::now();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<u32, String> = retry_transient(
            RetryPolicy::default(),
            "exec",
            |_| true,
            move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err("connection reset".to_string())
                    } else {
                        Ok(n)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_does_not_repeat_permanent_errors() {
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), String> = retry_transient(
            RetryPolicy::default(),
            "exec",
            |e: &String| e.starts_with("transient"),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("exit status 1".to_string())
                }
            },
        )
        .await;

        assert_eq!(result.unwrap_err(), "exit status 1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
