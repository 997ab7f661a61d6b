//! Internal module for parsing email content.

use mailparse::{parse_mail, DispositionType, MailHeaderMap, ParsedMail};
use tracing::{debug, warn};

/// How to turn the body bytes of a part into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CharsetPolicy {
    /// Use the part's declared charset, replacing undecodable bytes.
    Declared,
    /// Always decode as UTF-8, replacing invalid sequences.
    Utf8,
}

/// Extracts the first plain-text, non-attachment body from a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BodyExtractor {
    charset: CharsetPolicy,
    /// Whether a non-multipart message must be `text/plain` to be used.
    single_part_plain_only: bool,
}

impl BodyExtractor {
    /// IMAP flavour: honours the declared charset, single parts must be plain text.
    pub(crate) const IMAP: Self = Self {
        charset: CharsetPolicy::Declared,
        single_part_plain_only: true,
    };

    /// POP3 flavour: UTF-8 only, single parts are taken whatever their type.
    pub(crate) const POP3: Self = Self {
        charset: CharsetPolicy::Utf8,
        single_part_plain_only: false,
    };

    /// Returns the message body as text, or an empty string if there is none.
    pub(crate) fn extract(&self, message: &ParsedMail<'_>) -> String {
        let part = if message.subparts.is_empty() {
            (!self.single_part_plain_only || is_plain_text(message)).then_some(message)
        } else {
            first_inline_plain_part(message)
        };

        match part {
            Some(part) => self.decode(part),
            None => {
                debug!(mimetype = %message.ctype.mimetype, "No plain-text body part");
                String::new()
            }
        }
    }

    fn decode(&self, part: &ParsedMail<'_>) -> String {
        let decoded = match self.charset {
            CharsetPolicy::Declared => part.get_body(),
            CharsetPolicy::Utf8 => part
                .get_body_raw()
                .map(|raw| String::from_utf8_lossy(&raw).into_owned()),
        };

        decoded.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to decode mail body");
            String::new()
        })
    }
}

/// Parses a raw RFC 822 message, logging and returning `None` if it is malformed.
pub(crate) fn parse_message(raw: &[u8]) -> Option<ParsedMail<'_>> {
    match parse_mail(raw) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(error = %e, "Failed to parse email, skipping message");
            None
        }
    }
}

/// Returns the first value of `name`, or an empty string.
pub(crate) fn header(message: &ParsedMail<'_>, name: &str) -> String {
    message
        .get_headers()
        .get_first_value(name)
        .unwrap_or_default()
}

fn is_plain_text(part: &ParsedMail<'_>) -> bool {
    part.ctype.mimetype.eq_ignore_ascii_case("text/plain")
}

fn is_attachment(part: &ParsedMail<'_>) -> bool {
    part.get_content_disposition().disposition == DispositionType::Attachment
}

/// Depth-first search for the first `text/plain` leaf that is not an attachment.
fn first_inline_plain_part<'a, 'b>(part: &'a ParsedMail<'b>) -> Option<&'a ParsedMail<'b>> {
    if part.subparts.is_empty() {
        return (is_plain_text(part) && !is_attachment(part)).then_some(part);
    }
    part.subparts.iter().find_map(first_inline_plain_part)
}
