//! IMAP backend.
//!
//! Each check opens a fresh implicit-TLS session, logs in, searches for
//! candidate mail and scans it newest-first. The message carrying the code is
//! flagged `\Deleted` and expunged before the code is handed back. The session
//! is logged out on every path.
//!
//! Providers that require an `ID` handshake (see [`crate::providers`]) do not
//! allow `TO` searches afterwards, so for them today's unseen mail is searched
//! instead and the `To` header is checked by hand.

use crate::config::{MailServerConfig, Protocol, RetrievalConfig, TimeoutConfig};
use crate::connection::{self, bounded};
use crate::error::{Error, Result};
use crate::mailbox::{poll_mailbox, Scan};
use crate::matcher::{CodeMatcher, Matcher, VerificationCode};
use crate::parser::{self, BodyExtractor};
use crate::providers;
use crate::retriever::FetchCode;
use crate::retry::RetryPolicy;
use crate::session::{self, ImapSession, ImapTransport};
use chrono::{Local, NaiveDate};
use std::future::Future;
use tracing::{debug, info, instrument, warn};

/// How candidate messages are located in the mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SearchMode {
    /// `TO "<account>"`.
    Recipient,
    /// `ON <today> UNSEEN`, recipient checked per message.
    TodayUnseen,
}

impl SearchMode {
    /// Picks the search mode for a login user.
    pub(crate) fn for_user(user: &str) -> Self {
        if providers::requires_id_handshake(user) {
            SearchMode::TodayUnseen
        } else {
            SearchMode::Recipient
        }
    }

    /// Builds the `SEARCH` criteria.
    pub(crate) fn query(self, account: &str, today: NaiveDate) -> String {
        match self {
            SearchMode::Recipient => {
                format!("TO \"{}\"", account.replace('\\', "\\\\").replace('"', "\\\""))
            }
            // IMAP date format: "DD-Mon-YYYY" (e.g., "07-Dec-2025")
            SearchMode::TodayUnseen => format!("ON {} UNSEEN", today.format("%d-%b-%Y")),
        }
    }
}

/// Looks for a verification code in one raw message.
///
/// The account address is removed from the body first so that digits inside
/// it are never mistaken for a code.
pub(crate) fn inspect_message(
    raw: &[u8],
    account: &str,
    mode: SearchMode,
) -> Option<VerificationCode> {
    let parsed = parser::parse_message(raw)?;

    if mode == SearchMode::TodayUnseen {
        let to = parser::header(&parsed, "To");
        if to != account {
            debug!(to = %to, "Skipping mail addressed to someone else");
            return None;
        }
    }

    let body = BodyExtractor::IMAP.extract(&parsed);
    if body.is_empty() {
        return None;
    }

    CodeMatcher::lenient().find_code(&body.replace(account, ""))
}

/// Fetches verification codes from an IMAP mailbox.
#[derive(Debug, Clone)]
pub struct ImapBackend {
    server: MailServerConfig,
    account: String,
    policy: RetryPolicy,
    timeouts: TimeoutConfig,
}

impl ImapBackend {
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
                message: "IMAP backend requires a mail server".into(),
            })?;

        Ok(Self {
            server,
            account: config.account().to_string(),
            policy: config.mailbox_retry,
            timeouts: config.timeouts.clone(),
        })
    }

    /// Checks the mailbox once over a fresh session.
    #[instrument(
        name = "ImapBackend::check",
        skip_all,
        fields(host = %self.server.host, user = %self.server.user())
    )]
    async fn check_once(&self) -> Result<Scan> {
        let tls_stream =
            connection::connect(&self.server, Protocol::Imap, self.timeouts.connect).await?;
        self.check_over(tls_stream).await
    }

    /// Logs in over an established stream, scans, then logs out whatever the outcome.
    pub(crate) async fn check_over<S: ImapTransport>(&self, stream: S) -> Result<Scan> {
        let command_timeout = self.timeouts.command;

        let mut session = bounded(
            "LOGIN",
            command_timeout,
            session::authenticate(stream, self.server.user(), self.server.password()),
        )
        .await?;

        let result = self.scan(&mut session).await;

        if let Err(e) = bounded("LOGOUT", command_timeout, session::logout(&mut session)).await {
            debug!(error = %e, "Logout failed");
        }

        result
    }

    async fn scan<S: ImapTransport>(&self, session: &mut ImapSession<S>) -> Result<Scan> {
        let command_timeout = self.timeouts.command;
        let user = self.server.user();
        let mode = SearchMode::for_user(user);

        if mode == SearchMode::TodayUnseen {
            let command = providers::id_command(user);
            debug!(
                provider = providers::provider_name(user).unwrap_or_default(),
                "Sending ID handshake"
            );
            bounded("ID", command_timeout, session::identify(session, &command)).await?;
        }

        bounded(
            "SELECT",
            command_timeout,
            session::select_mailbox(session, &self.server.folder),
        )
        .await?;

        let query = mode.query(&self.account, Local::now().date_naive());
        let uids = bounded("SEARCH", command_timeout, session::search(session, &query)).await?;

        if uids.is_empty() {
            return Ok(Scan::Pending);
        }
        debug!(
            candidates = uids.len(),
            matcher = CodeMatcher::lenient().description(),
            "Scanning candidates newest-first"
        );

        for &uid in uids.iter().rev() {
            let raw = match bounded(
                "FETCH",
                command_timeout,
                session::fetch_message(session, uid),
            )
            .await
            {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    debug!(uid, "Message has no body");
                    continue;
                }
                // A stalled session cannot serve further commands
                Err(e @ Error::CommandTimeout { .. }) => return Err(e),
                Err(e) => {
                    warn!(uid, error = %e, "Failed to fetch message, skipping");
                    continue;
                }
            };

            if let Some(code) = inspect_message(&raw, &self.account, mode) {
                info!(uid, "Verification code found");

                if let Err(e) = bounded(
                    "STORE",
                    command_timeout,
                    session::delete_message(session, uid),
                )
                .await
                {
                    warn!(uid, error = %e, "Failed to delete consumed message");
                }

                return Ok(Scan::Found(code));
            }
        }

        Ok(Scan::NoCode)
    }
}

impl FetchCode for ImapBackend {
    fn fetch_code(&self) -> impl Future<Output = Result<Option<VerificationCode>>> + Send {
        poll_mailbox(&self.policy, "imap", move || self.check_once())
    }
}
