//! Bounded retry with a fixed delay between attempts.
//!
//! Both retry layers of a retrieval are expressed with [`retry_with_policy`]:
//! the outer loop driven by [`VerificationCodeRetriever`](crate::VerificationCodeRetriever)
//! and the short sub-retry loop each mailbox backend runs while waiting for
//! mail to be delivered.
//!
//! # Example
//!
//! ```
//! use email_code::retry::{retry_with_policy, Outcome, RetryError, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let policy = RetryPolicy::new(3, Duration::ZERO);
//! let result: Result<u32, RetryError<()>> =
//!     retry_with_policy(&policy, |attempt| async move {
//!         if attempt == 2 { Outcome::Ready(attempt) } else { Outcome::NotReady }
//!     })
//!     .await;
//! assert_eq!(result.ok(), Some(2));
//! # }
//! ```

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first one).
    pub max_attempts: u32,
    /// Pause between two consecutive attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the given attempt cap and interval.
    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Outer retrieval loop: 5 attempts, one minute apart.
    #[must_use]
    pub const fn retrieval() -> Self {
        Self::new(5, Duration::from_secs(60))
    }

    /// Mailbox sub-retry loop: 20 checks, three seconds apart.
    #[must_use]
    pub const fn mailbox() -> Self {
        Self::new(20, Duration::from_secs(3))
    }

    /// Temp-mailbox cleanup: 5 delete requests, half a second apart.
    #[must_use]
    pub const fn cleanup() -> Self {
        Self::new(5, Duration::from_millis(500))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::retrieval()
    }
}

/// Result of a single attempt.
#[derive(Debug)]
pub enum Outcome<T, E> {
    /// The attempt produced a value; stop retrying.
    Ready(T),
    /// Nothing yet; try again after the interval.
    NotReady,
    /// The attempt failed in a way worth retrying.
    Failed(E),
    /// The attempt failed in a way that retrying cannot fix.
    Abort(E),
}

/// Why [`retry_with_policy`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt reported [`Outcome::NotReady`] (or the last one did).
    Exhausted {
        /// Attempts performed.
        attempts: u32,
    },
    /// The final attempt reported [`Outcome::Failed`].
    LastAttemptFailed {
        /// Attempts performed.
        attempts: u32,
        /// The final attempt's error.
        error: E,
    },
    /// An attempt reported [`Outcome::Abort`].
    Aborted(E),
}

/// Runs `op` until it is ready, aborts, or the policy's attempt cap is hit.
///
/// `op` receives the 1-based attempt number. The interval is slept between
/// attempts only, never after the last one.
pub async fn retry_with_policy<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Outcome<T, E>>,
{
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match op(attempt).await {
            Outcome::Ready(value) => return Ok(value),
            Outcome::NotReady => last_error = None,
            Outcome::Failed(error) => last_error = Some(error),
            Outcome::Abort(error) => return Err(RetryError::Aborted(error)),
        }

        if attempt < policy.max_attempts {
            debug!(
                attempt,
                max_attempts = policy.max_attempts,
                interval_ms = u64::try_from(policy.interval.as_millis()).unwrap_or(u64::MAX),
                "Sleeping before next attempt"
            );
            tokio::time::sleep(policy.interval).await;
        }
    }

    let attempts = policy.max_attempts;
    Err(match last_error {
        Some(error) => RetryError::LastAttemptFailed { attempts, error },
        None => RetryError::Exhausted { attempts },
    })
}
