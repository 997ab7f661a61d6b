//! Provider-specific IMAP quirks, keyed by email domain.
//!
//! Some providers refuse most commands until the client identifies itself
//! with the IMAP `ID` extension (RFC 2971). After identification they still
//! reject free-form `TO` searches, so mail has to be located with a date
//! search instead.
//!
//! # Example
//!
//! ```
//! use email_code::providers::requires_id_handshake;
//!
//! assert!(requires_id_handshake("someone@163.com"));
//! assert!(!requires_id_handshake("someone@gmail.com"));
//! ```

use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::collections::HashMap;

/// Domains whose IMAP servers demand an `ID` handshake, mapped to the provider name.
static ID_HANDSHAKE_DOMAINS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();

    // NetEase
    m.insert("163.com", "NetEase");
    m.insert("126.com", "NetEase");
    m.insert("yeah.net", "NetEase");

    m
});

/// Version string sent in the `ID` payload.
const CLIENT_VERSION: &str = "1.0.0";

/// Vendor string sent in the `ID` payload.
const CLIENT_VENDOR: &str = "email-code";

/// Returns the domain part of an address, lowercased.
fn domain_of(address: &str) -> String {
    address
        .rsplit_once('@')
        .map_or(address, |(_, domain)| domain)
        .to_lowercase()
}

/// Returns `true` if the login user's provider needs an `ID` handshake.
#[must_use]
pub fn requires_id_handshake(user: &str) -> bool {
    ID_HANDSHAKE_DOMAINS.contains_key(domain_of(user).as_str())
}

/// Returns the provider name for a login user, if it has known quirks.
#[must_use]
pub fn provider_name(user: &str) -> Option<&'static str> {
    ID_HANDSHAKE_DOMAINS.get(domain_of(user).as_str()).copied()
}

/// Builds the `ID` command identifying this client on behalf of `user`.
#[must_use]
pub fn id_command(user: &str) -> String {
    let name = user.split('@').next().unwrap_or(user);
    let fields = [
        ("name", name),
        ("contact", user),
        ("version", CLIENT_VERSION),
        ("vendor", CLIENT_VENDOR),
    ];

    let body = fields
        .iter()
        .map(|(key, value)| format!("\"{key}\" \"{}\"", quote_escape(value)))
        .collect::<Vec<_>>()
        .join(" ");

    format!("ID ({body})")
}

/// Escapes characters that are special inside an IMAP quoted string.
fn quote_escape(value: &str) -> Cow<'_, str> {
    if value.contains(['"', '\\']) {
        Cow::Owned(value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_netease_domains() {
        assert!(requires_id_handshake("user@163.com"));
        assert!(requires_id_handshake("user@126.com"));
        assert!(requires_id_handshake("user@yeah.net"));
        assert_eq!(provider_name("user@126.com"), Some("NetEase"));
    }

    #[test]
    fn test_other_domains() {
        assert!(!requires_id_handshake("user@gmail.com"));
        assert!(!requires_id_handshake("user@mail.163.com.example"));
        assert_eq!(provider_name("user@example.com"), None);
    }

    #[test]
    fn test_case_insensitive() {
        assert!(requires_id_handshake("User@163.COM"));
    }

    #[test]
    fn test_id_command() {
        assert_eq!(
            id_command("alice@163.com"),
            r#"ID ("name" "alice" "contact" "alice@163.com" "version" "1.0.0" "vendor" "email-code")"#
        );
    }

    #[test]
    fn test_id_command_escapes_quotes() {
        assert!(id_command("a\"b@163.com").contains(r#""contact" "a\"b@163.com""#));
    }
}
