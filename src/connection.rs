//! Internal module for establishing implicit-TLS connections to mail servers.
//!
//! Both the IMAP and the POP3 backends talk to their servers over the same
//! kind of stream: TLS from the first byte, no STARTTLS upgrade.

use crate::config::{MailServerConfig, Protocol};
use crate::error::{Error, Result};
use rustls::ClientConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};
use webpki_roots::TLS_SERVER_ROOTS;

/// A TLS stream over TCP, used for IMAP and POP3 communication.
pub(crate) type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Connects to the configured server for `protocol`, bounded by `timeout`.
pub(crate) async fn connect(
    server: &MailServerConfig,
    protocol: Protocol,
    timeout: Duration,
) -> Result<TlsStream> {
    let target_addr = server.server_address(protocol);

    tokio::time::timeout(
        timeout,
        establish_tls_connection(&server.host, &target_addr),
    )
    .await
    .map_err(|_| Error::ConnectTimeout {
        target: target_addr.clone(),
        timeout,
    })?
}

/// Runs one protocol command, failing with [`Error::CommandTimeout`] if it stalls.
pub(crate) async fn bounded<T>(
    command: &'static str,
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| Error::CommandTimeout { command, timeout })?
}

/// Establishes a TLS connection to a mail server.
#[instrument(
    name = "connection::establish_tls",
    skip_all,
    fields(host = %host, target_addr = %target_addr)
)]
pub(crate) async fn establish_tls_connection(host: &str, target_addr: &str) -> Result<TlsStream> {
    let connector = create_tls_connector();
    let server_name = parse_server_name(host)?;
    let tcp_stream = connect_direct(target_addr).await?;

    debug!("Performing TLS handshake");

    connector
        .connect(server_name, tcp_stream)
        .await
        .map_err(|source| Error::TlsConnect {
            target: target_addr.to_string(),
            source,
        })
}

/// Creates a TLS connector with the bundled web PKI roots.
fn create_tls_connector() -> TlsConnector {
    let mut root_cert_store = rustls::RootCertStore::empty();
    root_cert_store.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|ta| {
        rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    let tls_config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(tls_config))
}

/// Parses server name for TLS SNI.
fn parse_server_name(host: &str) -> Result<rustls::ServerName> {
    rustls::ServerName::try_from(host).map_err(|source| Error::InvalidDnsName {
        host: host.to_string(),
        source,
    })
}

/// Direct TCP connection.
async fn connect_direct(target_addr: &str) -> Result<TcpStream> {
    debug!(target = %target_addr, "Establishing TCP connection");

    TcpStream::connect(target_addr)
        .await
        .map_err(|source| Error::TcpConnect {
            target: target_addr.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_server_name() {
        assert!(parse_server_name("imap.163.com").is_ok());
        assert!(parse_server_name("pop.example.com").is_ok());
    }

    #[test]
    fn test_parse_invalid_server_name() {
        let result = parse_server_name("");
        assert!(matches!(result, Err(Error::InvalidDnsName { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result: Result<()> = bounded("RETR", Duration::from_secs(30), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(
            result,
            Err(Error::CommandTimeout { command: "RETR", .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_host_is_not_retryable() {
        let server = MailServerConfig::new("bad host name", "me@example.com", "secret").with_port(1);
        let err = connect(&server, Protocol::Pop3, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_refused_connection_is_retryable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = establish_tls_connection("localhost", &format!("127.0.0.1:{port}"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TcpConnect { .. }));
        assert!(err.is_retryable());
    }
}
