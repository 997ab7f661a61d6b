//! POP3 backend and a minimal async POP3 client.
//!
//! Each check opens a fresh implicit-TLS session, authenticates with
//! `USER`/`PASS`, lists the maildrop and retrieves the ten most recent
//! messages newest-first. Only mail from the expected sender is considered.
//! Consumed messages are left on the server.

use crate::config::{MailServerConfig, Protocol, RetrievalConfig, TimeoutConfig};
use crate::connection::{self, bounded};
use crate::error::{Error, Result};
use crate::mailbox::{poll_mailbox, Scan};
use crate::matcher::{CodeMatcher, Matcher, VerificationCode};
use crate::parser::{self, BodyExtractor};
use crate::retriever::FetchCode;
use crate::retry::RetryPolicy;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, instrument, trace};

/// How many of the most recent messages a check looks at.
pub const RECENT_WINDOW: usize = 10;

/// Longest line accepted from the server, terminator included.
pub const MAX_LINE_LENGTH: u64 = 8192;

/// A POP3 session over any byte stream.
///
/// Every command is bounded by the timeout given at construction.
#[derive(Debug)]
pub struct Pop3Session<S> {
    stream: BufReader<S>,
    timeout: Duration,
}

impl<S> Pop3Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an established stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting is missing, negative or malformed.
    pub async fn connect(stream: S, timeout: Duration) -> Result<Self> {
        let mut session = Self {
            stream: BufReader::new(stream),
            timeout,
        };

        bounded("greeting", timeout, session.read_status("greeting")).await?;
        debug!("POP3 greeting received");

        Ok(session)
    }

    /// Authenticates with `USER` and `PASS`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pop3Rejected`] if the server refuses the credentials.
    pub async fn login(&mut self, user: &str, password: &str) -> Result<()> {
        self.command("USER", Some(user)).await?;
        self.command("PASS", Some(password)).await?;
        Ok(())
    }

    /// Lists message numbers in the maildrop, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or a listing line is malformed.
    pub async fn list(&mut self) -> Result<Vec<u32>> {
        let timeout = self.timeout;
        let lines = bounded("LIST", timeout, async {
            self.send("LIST", None).await?;
            self.read_status("LIST").await?;
            self.read_multiline("LIST").await
        })
        .await?;

        let mut numbers = lines
            .iter()
            .map(|line| {
                let text = String::from_utf8_lossy(line);
                let number = text
                    .split_whitespace()
                    .next()
                    .and_then(|n| n.parse::<u32>().ok());
                number.ok_or_else(|| Error::Pop3Malformed {
                    command: "LIST",
                    line: text.into_owned(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        numbers.sort_unstable();

        Ok(numbers)
    }

    /// Retrieves message `number` as raw RFC 822 bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn retr(&mut self, number: u32) -> Result<Vec<u8>> {
        let timeout = self.timeout;
        let arg = number.to_string();
        let lines = bounded("RETR", timeout, async {
            self.send("RETR", Some(&arg)).await?;
            self.read_status("RETR").await?;
            self.read_multiline("RETR").await
        })
        .await?;

        Ok(lines.join(&b"\r\n"[..]))
    }

    /// Ends the session with `QUIT`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<()> {
        self.command("QUIT", None).await?;
        Ok(())
    }

    /// Sends a single-line command and returns the `+OK` status text.
    async fn command(&mut self, command: &'static str, arg: Option<&str>) -> Result<String> {
        let timeout = self.timeout;
        bounded(command, timeout, async {
            self.send(command, arg).await?;
            self.read_status(command).await
        })
        .await
    }

    async fn send(&mut self, command: &'static str, arg: Option<&str>) -> Result<()> {
        // Never trace the password
        if command == "PASS" {
            trace!("C: PASS ***");
        } else {
            trace!(command, arg, "C:");
        }

        let line = match arg {
            Some(arg) => format!("{command} {arg}\r\n"),
            None => format!("{command}\r\n"),
        };

        let stream = self.stream.get_mut();
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|source| Error::Pop3Io { command, source })?;
        stream
            .flush()
            .await
            .map_err(|source| Error::Pop3Io { command, source })
    }

    /// Reads one line, without its line terminator.
    ///
    /// Lines longer than [`MAX_LINE_LENGTH`] are rejected as malformed.
    async fn read_line(&mut self, command: &'static str) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        let read = (&mut self.stream)
            .take(MAX_LINE_LENGTH)
            .read_until(b'\n', &mut line)
            .await
            .map_err(|source| Error::Pop3Io { command, source })?;

        if read == 0 {
            return Err(Error::Pop3Io {
                command,
                source: std::io::ErrorKind::UnexpectedEof.into(),
            });
        }
        if read as u64 == MAX_LINE_LENGTH && line.last() != Some(&b'\n') {
            return Err(Error::Pop3Malformed {
                command,
                line: format!("line exceeds {MAX_LINE_LENGTH} bytes"),
            });
        }

        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        Ok(line)
    }

    /// Reads a status line; `-ERR` becomes [`Error::Pop3Rejected`].
    async fn read_status(&mut self, command: &'static str) -> Result<String> {
        let line = String::from_utf8_lossy(&self.read_line(command).await?).into_owned();
        trace!(status = %line, "S:");

        if let Some(rest) = line.strip_prefix("+OK") {
            Ok(rest.trim_start().to_string())
        } else if let Some(rest) = line.strip_prefix("-ERR") {
            Err(Error::Pop3Rejected {
                command,
                message: rest.trim_start().to_string(),
            })
        } else {
            Err(Error::Pop3Malformed { command, line })
        }
    }

    /// Reads a dot-terminated block, undoing dot-stuffing.
    async fn read_multiline(&mut self, command: &'static str) -> Result<Vec<Vec<u8>>> {
        let mut lines = Vec::new();
        loop {
            let mut line = self.read_line(command).await?;
            if line == b"." {
                return Ok(lines);
            }
            if line.starts_with(b"..") {
                line.remove(0);
            }
            lines.push(line);
        }
    }
}

/// Returns the most recent message numbers from a listing, newest first.
pub(crate) fn recent_window(numbers: &[u32]) -> impl Iterator<Item = u32> + '_ {
    numbers.iter().rev().take(RECENT_WINDOW).copied()
}

/// Looks for a verification code in one raw message from `expected_sender`.
pub(crate) fn inspect_message(raw: &[u8], expected_sender: &str) -> Option<VerificationCode> {
    let parsed = parser::parse_message(raw)?;

    let from = parser::header(&parsed, "From");
    if !from.contains(expected_sender) {
        trace!(from = %from, "Skipping mail from another sender");
        return None;
    }

    let body = BodyExtractor::POP3.extract(&parsed);
    if body.is_empty() {
        return None;
    }

    CodeMatcher::lenient().find_code(&body)
}

/// Fetches verification codes from a POP3 maildrop.
#[derive(Debug, Clone)]
pub struct Pop3Backend {
    server: MailServerConfig,
    expected_sender: String,
    policy: RetryPolicy,
    timeouts: TimeoutConfig,
}

impl Pop3Backend {
    /// Creates the backend from a retrieval configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if no mail server is configured.
    pub fn new(config: &RetrievalConfig) -> Result<Self> {
        let server = config
            .mail_server
            .clone()
            .ok_or_else(|| Error::InvalidConfig {
                message: "POP3 backend requires a mail server".into(),
            })?;

        Ok(Self {
            server,
            expected_sender: config.expected_sender.clone(),
            policy: config.mailbox_retry,
            timeouts: config.timeouts.clone(),
        })
    }

    /// Checks the maildrop once over a fresh session.
    #[instrument(
        name = "Pop3Backend::check",
        skip_all,
        fields(host = %self.server.host, user = %self.server.user())
    )]
    async fn check_once(&self) -> Result<Scan> {
        let tls_stream =
            connection::connect(&self.server, Protocol::Pop3, self.timeouts.connect).await?;
        let mut session = Pop3Session::connect(tls_stream, self.timeouts.command).await?;

        let result = self.scan(&mut session).await;

        if let Err(e) = session.quit().await {
            debug!(error = %e, "QUIT failed");
        }

        result
    }

    /// Logs in and scans the recent window of an open session.
    pub(crate) async fn scan<S>(&self, session: &mut Pop3Session<S>) -> Result<Scan>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        session
            .login(self.server.user(), self.server.password())
            .await?;

        let numbers = session.list().await?;
        debug!(
            message_count = numbers.len(),
            matcher = CodeMatcher::lenient().description(),
            "Listed maildrop"
        );

        for number in recent_window(&numbers) {
            let raw = session.retr(number).await?;
            if let Some(code) = inspect_message(&raw, &self.expected_sender) {
                info!(number, "Verification code found");
                return Ok(Scan::Found(code));
            }
        }

        Ok(Scan::Pending)
    }
}

impl FetchCode for Pop3Backend {
    fn fetch_code(&self) -> impl Future<Output = Result<Option<VerificationCode>>> + Send {
        poll_mailbox(&self.policy, "pop3", move || self.check_once())
    }
}
