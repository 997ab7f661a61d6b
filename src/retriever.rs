//! Verification code retrieval.
//!
//! [`VerificationCodeRetriever`] drives one [`FetchCode`] backend through the
//! outer retry loop. The backend is chosen from the configuration by
//! [`select_backend`]: no mail server means the temp-mailbox, otherwise the
//! configured protocol (POP3 unless IMAP is asked for).

use crate::config::{Protocol, RetrievalConfig};
use crate::error::{Error, Result};
use crate::imap::ImapBackend;
use crate::matcher::VerificationCode;
use crate::pop3::Pop3Backend;
use crate::retry::{retry_with_policy, Outcome, RetryError, RetryPolicy};
use crate::temp_mail::TempMailBackend;
use std::future::Future;
use tracing::{error, info, instrument, warn};

/// A source of verification codes.
///
/// One call is one outer attempt. `Ok(None)` means no code was found this
/// time; errors are classified with [`Error::is_retryable`].
pub trait FetchCode {
    /// Performs one retrieval attempt.
    fn fetch_code(&self) -> impl Future<Output = Result<Option<VerificationCode>>> + Send;
}

/// Which backend a configuration selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Hosted temp-mailbox over HTTP.
    TempMail,
    /// IMAP mailbox.
    Imap,
    /// POP3 mailbox.
    Pop3,
}

/// Selects the backend for `config`.
#[must_use]
pub fn select_backend(config: &RetrievalConfig) -> BackendKind {
    if config.mail_server.is_none() {
        return BackendKind::TempMail;
    }
    match config.effective_protocol() {
        Protocol::Imap => BackendKind::Imap,
        Protocol::Pop3 => BackendKind::Pop3,
    }
}

/// The backend chosen by [`select_backend`].
#[derive(Debug, Clone)]
pub enum Backend {
    /// Temp-mailbox backend.
    TempMail(TempMailBackend),
    /// IMAP backend.
    Imap(ImapBackend),
    /// POP3 backend.
    Pop3(Pop3Backend),
}

impl Backend {
    /// Builds the backend selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the selected backend cannot be
    /// built from `config`.
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        Ok(match select_backend(config) {
            BackendKind::TempMail => Backend::TempMail(TempMailBackend::new(config)?),
            BackendKind::Imap => Backend::Imap(ImapBackend::new(config)?),
            BackendKind::Pop3 => Backend::Pop3(Pop3Backend::new(config)?),
        })
    }

    /// Returns which kind of backend this is.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::TempMail(_) => BackendKind::TempMail,
            Backend::Imap(_) => BackendKind::Imap,
            Backend::Pop3(_) => BackendKind::Pop3,
        }
    }
}

impl FetchCode for Backend {
    fn fetch_code(&self) -> impl Future<Output = Result<Option<VerificationCode>>> + Send {
        async move {
            match self {
                Backend::TempMail(backend) => backend.fetch_code().await,
                Backend::Imap(backend) => backend.fetch_code().await,
                Backend::Pop3(backend) => backend.fetch_code().await,
            }
        }
    }
}

/// Retrieves a verification code, retrying until one arrives.
///
/// # Example
///
/// ```no_run
/// use email_code::{RetrievalConfig, TempMailConfig, VerificationCodeRetriever};
///
/// # async fn example() -> email_code::Result<()> {
/// let config = RetrievalConfig::builder()
///     .account("signup@example.com")
///     .temp_mail(TempMailConfig::new("myinbox", "@mailto.plus", "pin"))
///     .build()?;
///
/// let retriever = VerificationCodeRetriever::new(&config)?;
/// let code = retriever.retrieve().await?;
/// println!("code: {code}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct VerificationCodeRetriever<B = Backend> {
    backend: B,
}

impl VerificationCodeRetriever<Backend> {
    /// Creates a retriever over the backend selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the backend cannot be built.
    pub fn new(config: &RetrievalConfig) -> Result<Self> {
        let backend = Backend::from_config(config)?;
        info!(
            backend = ?backend.kind(),
            account = %config.account(),
            "Verification code retriever ready"
        );
        Ok(Self { backend })
    }
}

impl<B: FetchCode> VerificationCodeRetriever<B> {
    /// Creates a retriever over an explicit backend.
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Retrieves a code with the default policy (5 attempts, 60 s apart).
    ///
    /// # Errors
    ///
    /// See [`retrieve_with`](Self::retrieve_with).
    pub async fn retrieve(&self) -> Result<VerificationCode> {
        self.retrieve_with(&RetryPolicy::retrieval()).await
    }

    /// Retrieves a code, making at most `policy.max_attempts` attempts.
    ///
    /// `policy.max_attempts` must be at least 1.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] if `policy` allows zero attempts
    /// - [`Error::RetrievalExhausted`] if no attempt produced a code
    /// - [`Error::RetrievalError`] if the final attempt failed
    /// - any non-retryable error immediately
    #[instrument(
        name = "VerificationCodeRetriever::retrieve",
        skip_all,
        fields(max_attempts = policy.max_attempts)
    )]
    pub async fn retrieve_with(&self, policy: &RetryPolicy) -> Result<VerificationCode> {
        if policy.max_attempts == 0 {
            return Err(Error::InvalidConfig {
                message: "retrieval policy needs at least one attempt".into(),
            });
        }

        let backend = &self.backend;
        let max_attempts = policy.max_attempts;

        let result = retry_with_policy(policy, move |attempt| async move {
            info!(attempt, max_attempts, "Retrieving verification code");

            match backend.fetch_code().await {
                Ok(Some(code)) => {
                    info!(attempt, "Verification code obtained");
                    Outcome::Ready(code)
                }
                Ok(None) => {
                    if attempt < max_attempts {
                        warn!(attempt, "Verification code not obtained, retrying");
                    }
                    Outcome::NotReady
                }
                Err(e) if e.is_retryable() => {
                    error!(attempt, error = %e, "Retrieval attempt failed");
                    Outcome::Failed(e)
                }
                Err(e) => {
                    error!(attempt, error = %e, "Retrieval aborted");
                    Outcome::Abort(e)
                }
            }
        })
        .await;

        result.map_err(|e| match e {
            RetryError::Exhausted { attempts } => {
                error!(attempts, "No verification code after all attempts");
                Error::RetrievalExhausted { attempts }
            }
            RetryError::LastAttemptFailed { attempts, error } => Error::RetrievalError {
                attempts,
                source: Box::new(error),
            },
            RetryError::Aborted(e) => e,
        })
    }

    /// Blocking variant of [`retrieve_with`](Self::retrieve_with).
    ///
    /// Runs on a private current-thread runtime; must not be called from
    /// within an async context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] if the runtime cannot be started, otherwise
    /// the same errors as [`retrieve_with`](Self::retrieve_with).
    pub fn retrieve_blocking(&self, policy: &RetryPolicy) -> Result<VerificationCode> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| Error::Runtime { source })?;

        runtime.block_on(self.retrieve_with(policy))
    }
}
