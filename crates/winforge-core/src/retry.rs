//! Retry policy engine
//!
//! Bounded retry with configurable backoff, used by the command executor for
//! external process invocations. The policy is an explicit parameter object
//! rather than an implicit loop so callers can tune attempts per call site.

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff strategy between retry attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// No delay between attempts
    None,
    /// Constant delay between attempts
    #[default]
    FixedDelay,
    /// Delay grows linearly with the attempt number
    LinearBackoff,
    /// Delay doubles (by the multiplier) with each attempt
    ExponentialBackoff,
}

/// Retry policy parameter object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff strategy
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Multiplier for exponential strategies
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Delay cap in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_initial_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: RetryStrategy::default(),
            backoff_multiplier: default_backoff_multiplier(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl RetryPolicy {
    /// A policy with the given attempt budget and the default backoff
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// A single-attempt policy (no retries)
    pub fn once() -> Self {
        Self::with_attempts(1)
    }
}

/// Calculate the delay before the next retry attempt
///
/// `attempt` is 1-indexed. With `jitter`, up to 25% random variation is added
/// on top of the computed delay.
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32, jitter: bool) -> Duration {
    let attempt_index = attempt.saturating_sub(1);

    let base_delay_ms = match policy.strategy {
        RetryStrategy::None => 0,
        RetryStrategy::FixedDelay => policy.initial_delay_ms,
        RetryStrategy::LinearBackoff => policy.initial_delay_ms * (attempt_index as u64 + 1),
        RetryStrategy::ExponentialBackoff => {
            let multiplier = policy.backoff_multiplier.powf(attempt_index as f64);
            (policy.initial_delay_ms as f64 * multiplier) as u64
        }
    };

    let capped_delay_ms = base_delay_ms.min(policy.max_delay_ms);

    let final_delay_ms = if jitter && capped_delay_ms > 0 {
        let jitter_range = capped_delay_ms / 4;
        let jitter_value = rand::rng().random_range(0..=jitter_range);
        capped_delay_ms + jitter_value
    } else {
        capped_delay_ms
    };

    Duration::from_millis(final_delay_ms)
}

/// Error produced when a retried operation never succeeds
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// Number of attempts made before giving up
    pub attempts: u32,
    /// The error from the final attempt
    pub source: E,
    /// Total duration spent across all attempts
    pub total_duration: Duration,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "retry exhausted after {} attempts over {:.2}s: {}",
            self.attempts,
            self.total_duration.as_secs_f64(),
            self.source
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryExhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Execute an async operation under a retry policy
///
/// The closure receives the 1-indexed attempt number so callers can record
/// per-attempt context (the command executor appends each failure to the
/// error log from inside the closure). Returns the first success, or
/// `RetryExhausted` carrying the final error once the attempt budget is
/// spent. A `max_attempts` of zero behaves like one attempt.
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match op(attempt).await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if attempt >= max_attempts {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        source: err,
                        total_duration: start.elapsed(),
                    });
                }

                let delay = calculate_delay(policy, attempt, false);
                tracing::debug!(
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, will retry"
                );

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    unreachable!("retry loop returns from within its final attempt")
}
