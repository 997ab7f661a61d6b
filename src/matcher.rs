//! Verification code matching.
//!
//! A verification code is a run of exactly six ASCII digits standing on its
//! own. Two variants of [`CodeMatcher`] exist:
//!
//! - [`CodeMatcher::lenient`] only requires digit boundaries around the run.
//! - [`CodeMatcher::strict`] additionally rejects runs directly preceded by a
//!   letter, `@` or `.`, so fragments of addresses and domains in the body
//!   are never taken for a code.
//!
//! # Example
//!
//! ```
//! use email_code::matcher::{CodeMatcher, Matcher};
//!
//! let strict = CodeMatcher::strict();
//! assert_eq!(strict.find_match("Your code is 123456.").as_deref(), Some("123456"));
//! assert_eq!(strict.find_match("mail me at x@123456.io"), None);
//!
//! let lenient = CodeMatcher::lenient();
//! assert_eq!(lenient.find_match("mail me at x@123456.io").as_deref(), Some("123456"));
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::fmt;

/// Exactly six digits, flanked by word boundaries.
static SIX_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[0-9]{6}\b").expect("six-digit pattern is valid"));

/// Trait for matching and extracting content from email bodies.
pub trait Matcher: Send + Sync {
    /// Attempts to find and extract matching content from the text.
    ///
    /// Returns `Some(matched_value)` if found, `None` otherwise.
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>>;

    /// Returns a human-readable description of what this matcher looks for.
    ///
    /// Used in logging.
    fn description(&self) -> &str;
}

/// A six-digit verification code.
///
/// Only constructible from exactly six ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VerificationCode(String);

impl VerificationCode {
    /// Wraps `value` if it is exactly six ASCII digits.
    ///
    /// ```
    /// use email_code::VerificationCode;
    ///
    /// assert!(VerificationCode::parse("042917").is_some());
    /// assert!(VerificationCode::parse("42917").is_none());
    /// assert!(VerificationCode::parse("04291a").is_none());
    /// ```
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        (value.len() == 6 && value.bytes().all(|b| b.is_ascii_digit()))
            .then(|| Self(value.to_string()))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the code, returning the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VerificationCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Matcher for six-digit verification codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeMatcher {
    reject_address_fragments: bool,
}

impl CodeMatcher {
    /// Matches any six-digit run bounded by non-word characters.
    #[must_use]
    pub const fn lenient() -> Self {
        Self {
            reject_address_fragments: false,
        }
    }

    /// Like [`lenient`](Self::lenient), but skips runs preceded by a letter, `@` or `.`.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            reject_address_fragments: true,
        }
    }

    /// Returns the first code in `text`, if any.
    #[must_use]
    pub fn find_code(&self, text: &str) -> Option<VerificationCode> {
        self.find_match(text)
            .and_then(|found| VerificationCode::parse(&found))
    }

    fn accepts_prefix(&self, text: &str, start: usize) -> bool {
        if !self.reject_address_fragments {
            return true;
        }
        !matches!(
            text[..start].chars().next_back(),
            Some(c) if c.is_ascii_alphabetic() || c == '@' || c == '.'
        )
    }
}

impl Matcher for CodeMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        SIX_DIGITS
            .find_iter(text)
            .find(|m| self.accepts_prefix(text, m.start()))
            .map(|m| Cow::Borrowed(m.as_str()))
    }

    fn description(&self) -> &str {
        if self.reject_address_fragments {
            "6-digit code (strict)"
        } else {
            "6-digit code"
        }
    }
}
