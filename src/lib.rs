//! # email-code
//!
//! Async retrieval of emailed verification codes.
//!
//! This crate waits for a six-digit verification code sent to an account and
//! hands it back, from one of three sources:
//! - a hosted temp-mailbox reached over HTTP
//! - an IMAP mailbox
//! - a POP3 mailbox
//!
//! Without a mail server the temp-mailbox is used. With one, POP3 is the
//! default and IMAP is used when asked for.
//!
//! ## Quick Start
//!
//! ```no_run
//! use email_code::{MailServerConfig, RetrievalConfig, VerificationCodeRetriever};
//!
//! # async fn example() -> email_code::Result<()> {
//! let config = RetrievalConfig::builder()
//!     .account("signup-4821@example.com")
//!     .mail_server(MailServerConfig::new("imap.example.com", "me@example.com", "app-password"))
//!     .protocol("IMAP")
//!     .build()?;
//!
//! let retriever = VerificationCodeRetriever::new(&config)?;
//! let code = retriever.retrieve().await?;
//! println!("Got code: {code}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Blocking Callers
//!
//! ```no_run
//! use email_code::{RetrievalConfig, RetryPolicy, TempMailConfig, VerificationCodeRetriever};
//!
//! # fn example() -> email_code::Result<()> {
//! let config = RetrievalConfig::builder()
//!     .account("myinbox@mailto.plus")
//!     .temp_mail(TempMailConfig::new("myinbox", "@mailto.plus", "epin"))
//!     .build()?;
//!
//! let code = VerificationCodeRetriever::new(&config)?
//!     .retrieve_blocking(&RetryPolicy::retrieval())?;
//! # let _ = code;
//! # Ok(())
//! # }
//! ```
//!
//! ## Code Matching
//!
//! ```
//! use email_code::matcher::{CodeMatcher, Matcher};
//!
//! let lenient = CodeMatcher::lenient();
//! assert_eq!(lenient.find_match("Your code is 123456").as_deref(), Some("123456"));
//!
//! // The strict matcher ignores digit runs glued to an address
//! let strict = CodeMatcher::strict();
//! assert_eq!(strict.find_match("Write to help@123456.io"), None);
//! ```
//!
//! ## Error Handling
//!
//! Use [`Error::is_retryable`] to tell transient failures from permanent ones:
//!
//! ```
//! use email_code::Error;
//!
//! fn handle_error(error: &Error) {
//!     if error.is_retryable() {
//!         println!("Transient error, can retry: {}", error);
//!     } else {
//!         println!("Permanent error: {}", error);
//!     }
//! }
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation.
//!
//! ### Span Naming Convention
//!
//! - `VerificationCodeRetriever::retrieve` - Outer retry loop
//! - `ImapBackend::check` - One IMAP mailbox check
//! - `Pop3Backend::check` - One POP3 mailbox check
//! - `TempMailBackend::fetch_latest` - Temp-mailbox lookup
//! - `TempMailBackend::delete` - Temp-mailbox cleanup
//! - `session::authenticate` - IMAP authentication
//! - `connection::establish_tls` - TLS connection
//!
//! ### Standard Fields
//!
//! - `attempt` - Attempt number within a retry loop
//! - `host` - Mail server hostname
//! - `user` - Login user
//! - `uid` - IMAP message UID
//! - `message_id` - Temp-mailbox message id

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod config;
pub mod error;
pub mod imap;
pub mod matcher;
pub mod pop3;
pub mod providers;
pub mod retriever;
pub mod retry;
pub mod temp_mail;

// Internal modules
mod connection;
mod mailbox;
mod parser;
mod session;

// Re-exports for ergonomic API
pub use config::{
    MailServerConfig, Protocol, RetrievalConfig, RetrievalConfigBuilder, TempMailConfig,
    TimeoutConfig,
};
pub use error::{Error, ErrorCategory, Result};
pub use imap::ImapBackend;
pub use matcher::{CodeMatcher, VerificationCode};
pub use pop3::Pop3Backend;
pub use retriever::{select_backend, Backend, BackendKind, FetchCode, VerificationCodeRetriever};
pub use retry::RetryPolicy;
pub use temp_mail::TempMailBackend;
