//! Error types for the email-code crate.
//!
//! Every variant carries the target, command or attempt count it failed on.
//! [`Error::is_retryable`] separates transient failures from permanent ones.
//!
//! Transport failures (network, TLS, protocol, HTTP) are retryable and are
//! downgraded to "no code this attempt" at the backend boundary. Only the
//! retrieval outcomes ([`Error::RetrievalExhausted`], [`Error::RetrievalError`])
//! and configuration errors normally reach the caller.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while retrieving a verification code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration / validation errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid email address format.
    #[error("invalid email format: {email}")]
    InvalidEmailFormat {
        /// The invalid email address.
        email: String,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    /// The async runtime backing the blocking API could not be started.
    #[error("failed to start async runtime")]
    Runtime {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Network / connection errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to establish TCP connection.
    #[error("failed to connect to {target}")]
    TcpConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection.
    #[error("failed to establish TLS connection to {target}")]
    TlsConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// HTTP request to the temp-mailbox API failed.
    #[error("HTTP request to {url} failed")]
    Http {
        /// The request URL (without credentials).
        url: String,
        /// The underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Timeout errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// Connection timeout.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// A single protocol command did not complete in time.
    #[error("{command} timed out after {timeout:?}")]
    CommandTimeout {
        /// The protocol command that stalled.
        command: &'static str,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IMAP protocol errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// IMAP login failed.
    #[error("IMAP login failed for {user}")]
    ImapLogin {
        /// The user used for login.
        user: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// An IMAP command failed.
    #[error("IMAP {command} failed")]
    ImapCommand {
        /// The IMAP command that failed.
        command: &'static str,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // POP3 protocol errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// I/O failure on an established POP3 connection.
    #[error("POP3 I/O error during {command}")]
    Pop3Io {
        /// The POP3 command in flight.
        command: &'static str,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The POP3 server answered `-ERR`.
    #[error("POP3 {command} rejected: {message}")]
    Pop3Rejected {
        /// The POP3 command that was rejected.
        command: &'static str,
        /// The server's status text.
        message: String,
    },

    /// The POP3 server sent something that is not a valid response.
    #[error("malformed POP3 response to {command}: {line}")]
    Pop3Malformed {
        /// The POP3 command in flight.
        command: &'static str,
        /// The offending line.
        line: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Retrieval outcomes
    // ─────────────────────────────────────────────────────────────────────────
    /// A mailbox backend's sub-retry budget ran out without any candidate mail.
    #[error("verification code not delivered after {attempts} mailbox checks")]
    RetrievalTimeout {
        /// Number of mailbox checks performed.
        attempts: u32,
    },

    /// Every outer attempt completed without finding a code.
    #[error("verification code not obtained after {attempts} attempts")]
    RetrievalExhausted {
        /// Number of outer attempts performed.
        attempts: u32,
    },

    /// The final outer attempt failed with an error.
    #[error("failed to get verification code after {attempts} attempts")]
    RetrievalError {
        /// Number of outer attempts performed.
        attempts: u32,
        /// The error raised by the final attempt.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Returns `true` if this error represents a transient failure that might succeed on retry.
    ///
    /// Backends swallow retryable errors (logging them) and report "no code";
    /// the retrieval loop retries them. Everything else propagates immediately.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::TcpConnect { .. }
            | Error::TlsConnect { .. }
            | Error::Http { .. }
            | Error::ConnectTimeout { .. }
            | Error::CommandTimeout { .. }
            | Error::ImapLogin { .. }
            | Error::ImapCommand { .. }
            | Error::Pop3Io { .. }
            | Error::Pop3Rejected { .. }
            | Error::Pop3Malformed { .. }
            | Error::RetrievalTimeout { .. } => true,

            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidDnsName { .. }
            | Error::Runtime { .. }
            | Error::RetrievalExhausted { .. }
            | Error::RetrievalError { .. } => false,
        }
    }

    /// Returns the error category for metrics/logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidDnsName { .. }
            | Error::Runtime { .. } => ErrorCategory::Configuration,

            Error::TcpConnect { .. } | Error::TlsConnect { .. } | Error::Http { .. } => {
                ErrorCategory::Network
            }

            Error::ConnectTimeout { .. } | Error::CommandTimeout { .. } => ErrorCategory::Timeout,

            Error::ImapLogin { .. }
            | Error::ImapCommand { .. }
            | Error::Pop3Io { .. }
            | Error::Pop3Rejected { .. }
            | Error::Pop3Malformed { .. } => ErrorCategory::Protocol,

            Error::RetrievalTimeout { .. }
            | Error::RetrievalExhausted { .. }
            | Error::RetrievalError { .. } => ErrorCategory::Retrieval,
        }
    }
}

/// Error categories for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or validation errors.
    Configuration,
    /// Network connectivity errors.
    Network,
    /// Timeout errors.
    Timeout,
    /// IMAP or POP3 protocol errors.
    Protocol,
    /// Retry budgets ran out.
    Retrieval,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Retrieval => write!(f, "retrieval"),
        }
    }
}
