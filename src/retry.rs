//! Exponential backoff for rate-limited remote calls
//!
//! Every remote embedding batch and generation call runs through
//! [`with_retry`]. Only errors that report themselves as rate limiting are
//! retried; anything else is returned to the caller on the first failure.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Message shown to users when a remote service keeps refusing requests
pub const UNAVAILABLE_MESSAGE: &str =
    "The service is temporarily unavailable due to rate limiting. Please try again in a moment.";

/// Implemented by error types that can carry a "too many requests" signal
pub trait RateLimitSignal {
    fn is_rate_limited(&self) -> bool;
}

/// How many attempts to make and how long to wait between them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_retries: u32,
    /// Wait before the second attempt; doubled for each further attempt
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

/// Terminal state of a retried call
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    Succeeded(T),
    /// Every attempt was rate limited
    Exhausted { attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RetryOutcome<U> {
        match self {
            RetryOutcome::Succeeded(value) => RetryOutcome::Succeeded(f(value)),
            RetryOutcome::Exhausted { attempts } => RetryOutcome::Exhausted { attempts },
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryOutcome::Exhausted { .. })
    }

    pub fn succeeded(self) -> Option<T> {
        match self {
            RetryOutcome::Succeeded(value) => Some(value),
            RetryOutcome::Exhausted { .. } => None,
        }
    }

    /// Convert exhaustion into an error for non-interactive callers
    pub fn into_result(self) -> crate::Result<T> {
        match self {
            RetryOutcome::Succeeded(value) => Ok(value),
            RetryOutcome::Exhausted { .. } => Err(crate::CasefileError::ServiceUnavailable(
                UNAVAILABLE_MESSAGE.to_string(),
            )),
        }
    }
}

/// Run `f` until it succeeds, fails with a non rate-limit error, or the
/// policy's attempts are used up.
///
/// The wait between attempts is a `tokio` sleep, so only the calling task is
/// suspended.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> Result<RetryOutcome<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RateLimitSignal + Display,
{
    let max_attempts = policy.max_retries.max(1);

    for attempt in 1..=max_attempts {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!("{operation} succeeded on attempt {attempt}");
                }
                return Ok(RetryOutcome::Succeeded(value));
            }
            Err(e) if e.is_rate_limited() => {
                if attempt == max_attempts {
                    tracing::warn!("{operation} still rate limited after {attempt} attempts");
                    return Ok(RetryOutcome::Exhausted { attempts: attempt });
                }
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    "{operation} rate limited, retrying in {}ms ({attempt}/{max_attempts})",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::debug!("{operation} failed without retry: {e}");
                return Err(e);
            }
        }
    }

    Ok(RetryOutcome::Exhausted {
        attempts: max_attempts,
    })
}
