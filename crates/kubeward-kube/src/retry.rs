//! Bounded retry with exponential backoff and jitter
//!
//! Only failures the caller marks as transient are retried; everything else
//! is returned on the first attempt. The loop never sleeps past the total
//! ceiling, so the last error is returned once the next delay would exceed it.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, warn};

/// Backoff settings for a retried operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Upper bound of a single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Growth factor between delays
    pub multiplier: f64,

    /// Total time budget across all attempts
    #[serde(with = "humantime_serde")]
    pub ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            ceiling: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            ceiling: Duration::ZERO,
            ..Default::default()
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.multiplier).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Run `operation` until it succeeds, fails permanently or the ceiling is hit
///
/// `should_retry` decides which errors are transient.
pub async fn retry_while<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    operation_name: &str,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: fmt::Display,
{
    let started = Instant::now();
    let mut attempt = 0u32;
    let mut delay = policy.initial_delay;

    loop {
        attempt += 1;

        let e = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !should_retry(&e) {
            return Err(e);
        }

        // Add jitter: 0.5x to 1.5x of the delay
        let jitter = rand::rng().random_range(0.5..1.5);
        let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

        if started.elapsed() + jittered_delay > policy.ceiling {
            error!(
                operation = %operation_name,
                attempt = attempt,
                elapsed_ms = started.elapsed().as_millis(),
                error = %e,
                "Giving up, retry ceiling reached"
            );
            return Err(e);
        }

        warn!(
            operation = %operation_name,
            attempt = attempt,
            error = %e,
            delay_ms = jittered_delay.as_millis(),
            "Operation failed, retrying"
        );

        tokio::time::sleep(jittered_delay).await;
        delay = policy.next_delay(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(ceiling_ms: u64) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
            ceiling: Duration::from_millis(ceiling_ms),
        }
    }

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let result: Result<i32, &str> =
            retry_while(&fast(100), "op", |_| true, || async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<u32, String> = retry_while(
            &fast(5_000),
            "op",
            |_| true,
            || {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 { Err(format!("attempt {}", n)) } else { Ok(n) }
                }
            },
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<(), &str> = retry_while(
            &fast(5_000),
            "op",
            |e: &&str| *e == "transient",
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("permanent")
                }
            },
        )
        .await;

        assert_eq!(result, Err("permanent"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stops_at_ceiling() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let started = std::time::Instant::now();

        let result: Result<(), &str> = retry_while(
            &fast(60),
            "op",
            |_| true,
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("still failing")
                }
            },
        )
        .await;

        assert_eq!(result, Err("still failing"));
        assert!(count.load(Ordering::SeqCst) > 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = fast(100);
        let mut delay = policy.initial_delay;
        for _ in 0..10 {
            delay = policy.next_delay(delay);
        }
        assert_eq!(delay, policy.max_delay);
    }

    #[test]
    fn test_policy_from_yaml() {
        let policy: RetryPolicy =
            serde_yaml::from_str("initialDelay: 250ms\nceiling: 1m\n").unwrap();
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.ceiling, Duration::from_secs(60));
        assert_eq!(policy.multiplier, 2.0);
    }
}
