//! Bounded retry with exponential backoff and jitter.
//!
//! Telemetry queries ride over the cluster network and fail transiently; the
//! SLO evaluator retries each query up to the configured attempt budget before
//! declaring the query failed for the cycle. Jitter keeps a fleet of
//! controllers from hammering the query endpoint in lockstep.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Retry budget for a single operation
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on the delay between retries
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy with the given attempt budget and default delays
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            attempts,
            ..Default::default()
        }
    }
}

/// Run an async operation under the given retry policy.
///
/// Returns the first success, or the last error once the attempt budget is
/// spent. Each retry doubles the delay (capped at `max_delay`) and applies
/// 0.5x-1.5x jitter.
pub async fn with_retries<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let budget = policy.attempts.max(1);
    let mut delay = policy.initial_delay;

    for attempt in 1..=budget {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt == budget => {
                warn!(
                    operation = %operation_name,
                    attempts = budget,
                    error = %e,
                    "Operation failed, attempt budget spent"
                );
                return Err(e);
            }
            Err(e) => {
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let sleep = Duration::from_secs_f64(delay.as_secs_f64() * jitter);
                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = sleep.as_millis(),
                    "Operation failed, retrying"
                );
                tokio::time::sleep(sleep).await;
                delay = (delay * 2).min(policy.max_delay);
            }
        }
    }

    unreachable!("loop returns on the final attempt")
}
