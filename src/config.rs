//! Configuration for a verification code retrieval session.
//!
//! Use [`RetrievalConfigBuilder`] to create a configuration with sensible defaults:
//!
//! ```
//! use email_code::{MailServerConfig, RetrievalConfig};
//!
//! let config = RetrievalConfig::builder()
//!     .account("signup-4821@example.com")
//!     .mail_server(MailServerConfig::new("imap.example.com", "me@example.com", "app-password"))
//!     .protocol("imap")
//!     .build()
//!     .expect("valid config");
//! ```
//!
//! A configuration without a mail server falls back to the temp-mailbox HTTP API:
//!
//! ```
//! use email_code::{RetrievalConfig, TempMailConfig};
//!
//! let config = RetrievalConfig::builder()
//!     .account("signup-4821@example.com")
//!     .temp_mail(TempMailConfig::new("myinbox", "@mailto.plus", "1234"))
//!     .build()
//!     .expect("valid config");
//! ```

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Default folder searched over IMAP.
pub const DEFAULT_FOLDER: &str = "INBOX";

/// Default temp-mailbox API endpoint.
pub const DEFAULT_TEMP_MAIL_URL: &str = "https://tempmail.plus";

/// Default sender accepted by the POP3 backend.
pub const DEFAULT_EXPECTED_SENDER: &str = "no-reply@cursor.sh";

/// Mailbox access protocol used when a mail server is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// IMAP over implicit TLS.
    Imap,
    /// POP3 over implicit TLS.
    Pop3,
}

impl Protocol {
    /// Interprets a configured protocol name.
    ///
    /// Matching is case-insensitive; anything other than `IMAP` (including
    /// nothing at all) means POP3.
    ///
    /// ```
    /// use email_code::Protocol;
    ///
    /// assert_eq!(Protocol::from_setting(Some("imap")), Protocol::Imap);
    /// assert_eq!(Protocol::from_setting(Some("smtp")), Protocol::Pop3);
    /// assert_eq!(Protocol::from_setting(None), Protocol::Pop3);
    /// ```
    #[must_use]
    pub fn from_setting(setting: Option<&str>) -> Self {
        match setting {
            Some(value) if value.trim().eq_ignore_ascii_case("imap") => Protocol::Imap,
            _ => Protocol::Pop3,
        }
    }

    /// Well-known implicit-TLS port for this protocol.
    #[must_use]
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Imap => 993,
            Protocol::Pop3 => 995,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Imap => write!(f, "IMAP"),
            Protocol::Pop3 => write!(f, "POP3"),
        }
    }
}

/// Connection settings for an IMAP or POP3 server.
///
/// The `password` is stored as a [`SecretString`] and never printed by `Debug`.
#[derive(Clone)]
pub struct MailServerConfig {
    /// Server hostname.
    pub host: String,
    /// Server port (defaults to the protocol's implicit-TLS port).
    pub port: Option<u16>,
    /// Login user, usually an email address.
    user: String,
    /// Password or app-specific password.
    password: SecretString,
    /// IMAP folder to search (ignored by POP3).
    pub folder: String,
}

impl MailServerConfig {
    /// Creates settings for `host` with the given credentials.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: None,
            user: user.into(),
            password: SecretString::from(password.into()),
            folder: DEFAULT_FOLDER.to_string(),
        }
    }

    /// Overrides the server port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Overrides the IMAP folder.
    #[must_use]
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    /// Returns the login user.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Returns the password as a string slice.
    ///
    /// Use this method when you need to pass the password to authentication.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Returns the full server address as "host:port" for `protocol`.
    #[must_use]
    pub fn server_address(&self, protocol: Protocol) -> String {
        format!(
            "{}:{}",
            self.host,
            self.port.unwrap_or_else(|| protocol.default_port())
        )
    }
}

impl std::fmt::Debug for MailServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("folder", &self.folder)
            .finish()
    }
}

/// Identity of a hosted temp-mailbox.
///
/// The mailbox address is `username` followed by `extension`
/// (for example `"myinbox"` + `"@mailto.plus"`).
#[derive(Clone)]
pub struct TempMailConfig {
    /// Local part of the mailbox address.
    pub username: String,
    /// Domain suffix, including the `@`.
    pub extension: String,
    /// Access pin protecting the mailbox.
    epin: SecretString,
    /// API base URL, without a trailing slash.
    pub base_url: String,
}

impl TempMailConfig {
    /// Creates a temp-mailbox identity using the default API endpoint.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        extension: impl Into<String>,
        epin: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            extension: extension.into(),
            epin: SecretString::from(epin.into()),
            base_url: DEFAULT_TEMP_MAIL_URL.to_string(),
        }
    }

    /// Points the client at a different API endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns the full mailbox address.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}{}", self.username, self.extension)
    }

    /// Returns the access pin.
    #[must_use]
    pub fn epin(&self) -> &str {
        self.epin.expose_secret()
    }
}

impl std::fmt::Debug for TempMailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempMailConfig")
            .field("username", &self.username)
            .field("extension", &self.extension)
            .field("epin", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Timeout configuration for individual network calls.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for a single IMAP or POP3 command.
    pub command: Duration,
    /// Timeout for a single HTTP request.
    pub http: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            command: Duration::from_secs(30),
            http: Duration::from_secs(30),
        }
    }
}

/// Settings for one retrieval session. Immutable once built.
///
/// Create using [`RetrievalConfig::builder()`].
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Recipient address the code is sent to.
    account: EmailAddress,
    /// IMAP/POP3 server; `None` selects the temp-mailbox backend.
    pub mail_server: Option<MailServerConfig>,
    /// Raw protocol setting, interpreted by [`Protocol::from_setting`].
    pub protocol: Option<String>,
    /// Temp-mailbox identity for the HTTP backend.
    pub temp_mail: Option<TempMailConfig>,
    /// Sender address a POP3 message must come from.
    pub expected_sender: String,
    /// Sub-retry policy for IMAP and POP3 mailbox checks.
    pub mailbox_retry: RetryPolicy,
    /// Retry policy for deleting consumed temp-mailbox messages.
    pub cleanup_retry: RetryPolicy,
    /// Pause after every temp-mailbox HTTP read.
    pub request_pause: Duration,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

impl RetrievalConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder::default()
    }

    /// Returns the recipient address as a string slice.
    #[must_use]
    pub fn account(&self) -> &str {
        self.account.as_str()
    }

    /// Returns the effective mailbox protocol.
    #[must_use]
    pub fn effective_protocol(&self) -> Protocol {
        Protocol::from_setting(self.protocol.as_deref())
    }
}

/// Validates an email address format.
fn validate_email(email: &str) -> Result<EmailAddress> {
    EmailAddress::parse_with_options(email, email_address::Options::default()).map_err(|_| {
        Error::InvalidEmailFormat {
            email: email.to_string(),
        }
    })
}

/// Builder for [`RetrievalConfig`].
#[derive(Debug, Default)]
pub struct RetrievalConfigBuilder {
    account: Option<String>,
    mail_server: Option<MailServerConfig>,
    protocol: Option<String>,
    temp_mail: Option<TempMailConfig>,
    expected_sender: Option<String>,
    mailbox_retry: Option<RetryPolicy>,
    cleanup_retry: Option<RetryPolicy>,
    request_pause: Option<Duration>,
    timeouts: Option<TimeoutConfig>,
}

impl RetrievalConfigBuilder {
    /// Sets the recipient address the code is sent to (required).
    #[must_use]
    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Sets the IMAP/POP3 server to poll.
    #[must_use]
    pub fn mail_server(mut self, server: MailServerConfig) -> Self {
        self.mail_server = Some(server);
        self
    }

    /// Sets the mailbox protocol (`"IMAP"` or `"POP3"`, case-insensitive).
    #[must_use]
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Sets the temp-mailbox identity used when no mail server is configured.
    #[must_use]
    pub fn temp_mail(mut self, temp_mail: TempMailConfig) -> Self {
        self.temp_mail = Some(temp_mail);
        self
    }

    /// Sets the sender address POP3 messages must come from.
    #[must_use]
    pub fn expected_sender(mut self, sender: impl Into<String>) -> Self {
        self.expected_sender = Some(sender.into());
        self
    }

    /// Sets the sub-retry policy for mailbox checks.
    #[must_use]
    pub fn mailbox_retry(mut self, policy: RetryPolicy) -> Self {
        self.mailbox_retry = Some(policy);
        self
    }

    /// Sets the retry policy for temp-mailbox cleanup.
    #[must_use]
    pub fn cleanup_retry(mut self, policy: RetryPolicy) -> Self {
        self.cleanup_retry = Some(policy);
        self
    }

    /// Sets the pause following each temp-mailbox HTTP read.
    #[must_use]
    pub fn request_pause(mut self, pause: Duration) -> Self {
        self.request_pause = Some(pause);
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = timeout;
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .command = timeout;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or invalid, if no
    /// mail server is set and no temp-mailbox is configured either, or if a
    /// retry policy allows zero attempts.
    pub fn build(self) -> Result<RetrievalConfig> {
        let account_raw = self.account.ok_or_else(|| Error::InvalidConfig {
            message: "account is required".into(),
        })?;
        let account = validate_email(&account_raw)?;

        if let Some(server) = &self.mail_server {
            if server.host.trim().is_empty() {
                return Err(Error::InvalidConfig {
                    message: "mail server host is empty".into(),
                });
            }
        } else if self.temp_mail.is_none() {
            return Err(Error::InvalidConfig {
                message: "either a mail server or a temp-mailbox is required".into(),
            });
        }

        for (name, policy) in [
            ("mailbox_retry", self.mailbox_retry),
            ("cleanup_retry", self.cleanup_retry),
        ] {
            if policy.is_some_and(|p| p.max_attempts == 0) {
                return Err(Error::InvalidConfig {
                    message: format!("{name} needs at least one attempt"),
                });
            }
        }

        Ok(RetrievalConfig {
            account,
            mail_server: self.mail_server,
            protocol: self.protocol,
            temp_mail: self.temp_mail,
            expected_sender: self
                .expected_sender
                .unwrap_or_else(|| DEFAULT_EXPECTED_SENDER.to_string()),
            mailbox_retry: self.mailbox_retry.unwrap_or_else(RetryPolicy::mailbox),
            cleanup_retry: self.cleanup_retry.unwrap_or_else(RetryPolicy::cleanup),
            request_pause: self.request_pause.unwrap_or(Duration::from_millis(500)),
            timeouts: self.timeouts.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> MailServerConfig {
        MailServerConfig::new("mail.example.com", "me@example.com", "secret")
    }

    #[test]
    fn test_builder_minimal_mail_server() {
        let config = RetrievalConfig::builder()
            .account("target@example.com")
            .mail_server(server())
            .build()
            .unwrap();

        assert_eq!(config.account(), "target@example.com");
        assert_eq!(config.effective_protocol(), Protocol::Pop3);
        assert_eq!(config.expected_sender, DEFAULT_EXPECTED_SENDER);
        assert_eq!(config.mailbox_retry, RetryPolicy::mailbox());
        assert_eq!(config.request_pause, Duration::from_millis(500));
    }

    #[test]
    fn test_builder_full() {
        let config = RetrievalConfig::builder()
            .account("target@example.com")
            .mail_server(server().with_port(1993).with_folder("Codes"))
            .protocol("IMAP")
            .expected_sender("codes@example.com")
            .mailbox_retry(RetryPolicy::new(2, Duration::ZERO))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        let mail_server = config.mail_server.as_ref().unwrap();
        assert_eq!(mail_server.folder, "Codes");
        assert_eq!(mail_server.server_address(Protocol::Imap), "mail.example.com:1993");
        assert_eq!(config.effective_protocol(), Protocol::Imap);
        assert_eq!(config.timeouts.connect, Duration::from_secs(5));
        assert_eq!(config.timeouts.command, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_missing_account() {
        let result = RetrievalConfig::builder().mail_server(server()).build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_invalid_account() {
        let result = RetrievalConfig::builder()
            .account("not-an-address")
            .mail_server(server())
            .build();
        assert!(matches!(result, Err(Error::InvalidEmailFormat { .. })));
    }

    #[test]
    fn test_builder_requires_some_backend() {
        let result = RetrievalConfig::builder()
            .account("target@example.com")
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_rejects_empty_host() {
        let result = RetrievalConfig::builder()
            .account("target@example.com")
            .mail_server(MailServerConfig::new("  ", "me@example.com", "secret"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(server().server_address(Protocol::Imap), "mail.example.com:993");
        assert_eq!(server().server_address(Protocol::Pop3), "mail.example.com:995");
    }

    #[test]
    fn test_protocol_setting_is_case_insensitive() {
        assert_eq!(Protocol::from_setting(Some("IMAP")), Protocol::Imap);
        assert_eq!(Protocol::from_setting(Some("Imap")), Protocol::Imap);
        assert_eq!(Protocol::from_setting(Some("pop3")), Protocol::Pop3);
        assert_eq!(Protocol::from_setting(Some("")), Protocol::Pop3);
    }

    #[test]
    fn test_temp_mail_address_and_url() {
        let temp = TempMailConfig::new("box", "@mailto.plus", "9999")
            .with_base_url("http://127.0.0.1:8080/");
        assert_eq!(temp.address(), "box@mailto.plus");
        assert_eq!(temp.base_url, "http://127.0.0.1:8080");
        assert_eq!(temp.epin(), "9999");
    }

    #[test]
    fn test_zero_attempt_policies_rejected() {
        let result = RetrievalConfig::builder()
            .account("target@example.com")
            .mail_server(server())
            .mailbox_retry(RetryPolicy::new(0, Duration::ZERO))
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));

        let result = RetrievalConfig::builder()
            .account("target@example.com")
            .temp_mail(TempMailConfig::new("box", "@mailto.plus", "1"))
            .cleanup_retry(RetryPolicy::new(0, Duration::from_millis(500)))
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));

        let config = RetrievalConfig::builder()
            .account("target@example.com")
            .mail_server(server())
            .mailbox_retry(RetryPolicy::new(1, Duration::ZERO))
            .build()
            .unwrap();
        assert_eq!(config.mailbox_retry.max_attempts, 1);
    }

    #[test]
    fn test_secrets_not_in_debug() {
        let config = RetrievalConfig::builder()
            .account("target@example.com")
            .mail_server(MailServerConfig::new("h", "u", "super-secret-password"))
            .temp_mail(TempMailConfig::new("box", "@mailto.plus", "pin-4242"))
            .build()
            .unwrap();

        let debug_str = format!("{config:?}");
        assert!(!debug_str.contains("super-secret-password"));
        assert!(!debug_str.contains("pin-4242"));
        assert!(debug_str.contains("[REDACTED]"));
    }
}
