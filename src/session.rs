//! Internal IMAP session management.
//!
//! This module wraps async-imap operations with proper error handling.
//! Sessions run over any [`ImapTransport`]; in production that is the
//! implicit-TLS stream from [`crate::connection`].

use crate::error::{Error, Result};
use async_imap::Session;
use futures::TryStreamExt;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, instrument};

/// Byte streams an IMAP session can run over.
pub(crate) trait ImapTransport: AsyncRead + AsyncWrite + Unpin + fmt::Debug + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + fmt::Debug + Send> ImapTransport for T {}

/// Type alias for an authenticated IMAP session.
pub(crate) type ImapSession<S> = Session<S>;

/// Authenticates to IMAP server and returns a session.
#[instrument(name = "session::authenticate", skip_all, fields(user = %user))]
pub(crate) async fn authenticate<S: ImapTransport>(
    stream: S,
    user: &str,
    password: &str,
) -> Result<ImapSession<S>> {
    let client = async_imap::Client::new(stream);

    debug!("Authenticating to IMAP server");

    client
        .login(user, password)
        .await
        .map_err(|e| Error::ImapLogin {
            user: user.to_string(),
            source: e.0,
        })
}

/// Sends an `ID` command (RFC 2971).
#[instrument(name = "session::identify", skip_all)]
pub(crate) async fn identify<S: ImapTransport>(
    session: &mut ImapSession<S>,
    command: &str,
) -> Result<()> {
    debug!("Identifying client");

    session
        .run_command_and_check_ok(command)
        .await
        .map_err(|source| Error::ImapCommand {
            command: "ID",
            source,
        })
}

/// Selects a mailbox (typically "INBOX").
#[instrument(name = "session::select", skip(session), fields(mailbox = %mailbox))]
pub(crate) async fn select_mailbox<S: ImapTransport>(
    session: &mut ImapSession<S>,
    mailbox: &str,
) -> Result<()> {
    debug!("Selecting mailbox");

    session
        .select(mailbox)
        .await
        .map_err(|source| Error::ImapCommand {
            command: "SELECT",
            source,
        })?;

    Ok(())
}

/// Runs a UID search and returns the matching UIDs in ascending order.
#[instrument(name = "session::search", skip(session), fields(query = %query))]
pub(crate) async fn search<S: ImapTransport>(
    session: &mut ImapSession<S>,
    query: &str,
) -> Result<Vec<u32>> {
    let uids = session
        .uid_search(query)
        .await
        .map_err(|source| Error::ImapCommand {
            command: "SEARCH",
            source,
        })?;

    let mut uids: Vec<u32> = uids.into_iter().collect();
    uids.sort_unstable();

    debug!(uid_count = uids.len(), "Found emails");

    Ok(uids)
}

/// Fetches the full raw message for `uid`.
///
/// Returns `None` if the server answered without a body (e.g. the message
/// was expunged concurrently).
#[instrument(name = "session::fetch", skip(session))]
pub(crate) async fn fetch_message<S: ImapTransport>(
    session: &mut ImapSession<S>,
    uid: u32,
) -> Result<Option<Vec<u8>>> {
    let messages: Vec<_> = session
        .uid_fetch(uid.to_string(), "BODY[]")
        .await
        .map_err(|source| Error::ImapCommand {
            command: "FETCH",
            source,
        })?
        .try_collect()
        .await
        .map_err(|source| Error::ImapCommand {
            command: "FETCH",
            source,
        })?;

    Ok(messages
        .iter()
        .find_map(|message| message.body().map(<[u8]>::to_vec)))
}

/// Flags `uid` as deleted and expunges the mailbox.
#[instrument(name = "session::delete", skip(session))]
pub(crate) async fn delete_message<S: ImapTransport>(
    session: &mut ImapSession<S>,
    uid: u32,
) -> Result<()> {
    let _: Vec<_> = session
        .uid_store(uid.to_string(), "+FLAGS (\\Deleted)")
        .await
        .map_err(|source| Error::ImapCommand {
            command: "STORE",
            source,
        })?
        .try_collect()
        .await
        .map_err(|source| Error::ImapCommand {
            command: "STORE",
            source,
        })?;

    let expunged: Vec<_> = session
        .expunge()
        .await
        .map_err(|source| Error::ImapCommand {
            command: "EXPUNGE",
            source,
        })?
        .try_collect()
        .await
        .map_err(|source| Error::ImapCommand {
            command: "EXPUNGE",
            source,
        })?;

    debug!(expunged = expunged.len(), "Message deleted");

    Ok(())
}

/// Logs out from IMAP session.
#[instrument(name = "session::logout", skip(session))]
pub(crate) async fn logout<S: ImapTransport>(session: &mut ImapSession<S>) -> Result<()> {
    debug!("Logging out");

    session
        .logout()
        .await
        .map_err(|source| Error::ImapCommand {
            command: "LOGOUT",
            source,
        })
}
