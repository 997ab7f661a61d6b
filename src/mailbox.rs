//! Internal sub-retry loop shared by the IMAP and POP3 backends.

use crate::error::{Error, Result};
use crate::matcher::VerificationCode;
use crate::retry::{retry_with_policy, Outcome, RetryError, RetryPolicy};
use std::future::Future;
use tracing::{debug, warn};

/// Result of checking a mailbox once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Scan {
    /// A code was found (and, where applicable, the message removed).
    Found(VerificationCode),
    /// Nothing suitable has arrived yet; check again shortly.
    Pending,
    /// Candidate mail was there but none of it carried a code.
    NoCode,
}

/// Checks a mailbox repeatedly until mail shows up or `policy` runs out.
///
/// Retryable transport errors are logged and reported as "no code" for this
/// outer attempt. Exhausting the policy yields [`Error::RetrievalTimeout`].
pub(crate) async fn poll_mailbox<F, Fut>(
    policy: &RetryPolicy,
    backend: &'static str,
    mut scan: F,
) -> Result<Option<VerificationCode>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Scan>>,
{
    let result = retry_with_policy(policy, |attempt| {
        let check = scan();
        async move {
            match check.await {
                Ok(Scan::Found(code)) => Outcome::Ready(Some(code)),
                Ok(Scan::NoCode) => Outcome::Ready(None),
                Ok(Scan::Pending) => {
                    debug!(backend, attempt, "No matching mail yet");
                    Outcome::NotReady
                }
                Err(e) if e.is_retryable() => {
                    warn!(backend, attempt, error = %e, "Mailbox check failed");
                    Outcome::Ready(None)
                }
                Err(e) => Outcome::Abort(e),
            }
        }
    })
    .await;

    result.map_err(|e| match e {
        RetryError::Aborted(e) => e,
        RetryError::Exhausted { attempts } | RetryError::LastAttemptFailed { attempts, .. } => {
            Error::RetrievalTimeout { attempts }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn code(value: &str) -> VerificationCode {
        VerificationCode::parse(value).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_twenty_empty_checks() {
        let checks = AtomicU32::new(0);
        let start = Instant::now();

        let result = poll_mailbox(&RetryPolicy::mailbox(), "test", || {
            checks.fetch_add(1, Ordering::SeqCst);
            async { Ok(Scan::Pending) }
        })
        .await;

        assert!(matches!(result, Err(Error::RetrievalTimeout { attempts: 20 })));
        assert_eq!(checks.load(Ordering::SeqCst), 20);
        assert_eq!(start.elapsed(), Duration::from_secs(57));
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_after_late_delivery() {
        let checks = AtomicU32::new(0);

        let result = poll_mailbox(&RetryPolicy::mailbox(), "test", || {
            let n = checks.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 4 {
                    Ok(Scan::Pending)
                } else {
                    Ok(Scan::Found(code("246810")))
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), Some(code("246810")));
        assert_eq!(checks.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_code_ends_the_attempt() {
        let checks = AtomicU32::new(0);

        let result = poll_mailbox(&RetryPolicy::mailbox(), "test", || {
            checks.fetch_add(1, Ordering::SeqCst);
            async { Ok(Scan::NoCode) }
        })
        .await;

        assert_eq!(result.unwrap(), None);
        assert_eq!(checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_downgraded() {
        let result = poll_mailbox(&RetryPolicy::mailbox(), "test", || async {
            Err(Error::Pop3Rejected {
                command: "PASS",
                message: "invalid password".into(),
            })
        })
        .await;

        assert_eq!(result.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configuration_error_propagates() {
        let result = poll_mailbox(&RetryPolicy::mailbox(), "test", || async {
            Err(Error::InvalidConfig {
                message: "broken".into(),
            })
        })
        .await;

        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}
