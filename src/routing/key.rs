//! Command key derivation.
//!
//! A command key names both the circuit breaker guarding a call and the
//! fallback payload served when that call fails. It is built from the first
//! two path segments plus an optional suffix taken from request headers:
//!
//! ```text
//! POST /orders/create.json        SOAPAction: "http://x/CreateOrder"
//!      └─────┬──────┘                                  └────┬────┘
//!        orders-create-                               CreateOrder
//!                     = orders-create-CreateOrder
//! ```

use std::borrow::Borrow;
use std::fmt;

use axum::http::{HeaderMap, HeaderName};

/// Identifies one circuit breaker and one fallback payload lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandKey(String);

impl CommandKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CommandKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CommandKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CommandKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Derives command keys from request paths and header hints.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    override_header: HeaderName,
    hint_header: HeaderName,
}

impl KeyBuilder {
    pub fn new(override_header: HeaderName, hint_header: HeaderName) -> Self {
        Self {
            override_header,
            hint_header,
        }
    }

    /// Build the key for a request path (without query) and its headers.
    pub fn build(&self, path: &str, headers: &HeaderMap) -> CommandKey {
        let mut key = path_prefix(path);
        key.push_str(&self.suffix(headers));
        CommandKey(key)
    }

    fn suffix(&self, headers: &HeaderMap) -> String {
        let overrides = header_values(headers, &self.override_header);
        if !overrides.is_empty() {
            let joined = overrides.join("-");
            if !joined.is_empty() {
                return joined;
            }
        }

        let hints = header_values(headers, &self.hint_header);
        if hints.is_empty() {
            return String::new();
        }
        last_token(&hints.join("/"))
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new(
            HeaderName::from_static("hystrix_prefix"),
            HeaderName::from_static("soapaction"),
        )
    }
}

fn header_values(headers: &HeaderMap, name: &HeaderName) -> Vec<String> {
    headers
        .get_all(name)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .collect()
}

/// Last non-empty run of characters other than `/`, `?` and `#`, after
/// removing double quotes.
fn last_token(value: &str) -> String {
    value
        .replace('"', "")
        .split(['/', '?', '#'])
        .rfind(|segment| !segment.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// First two non-empty path segments, each followed by `-`, with filename
/// extensions removed.
fn path_prefix(path: &str) -> String {
    strip_extensions(path)
        .split('/')
        .filter(|segment| !segment.is_empty())
        .take(2)
        .fold(String::new(), |mut acc, segment| {
            acc.push_str(segment);
            acc.push('-');
            acc
        })
}

/// Remove every `.` that is followed by one or more word characters,
/// together with those characters.
fn strip_extensions(path: &str) -> String {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut out = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '.' && chars.peek().copied().is_some_and(is_word) {
            while chars.peek().copied().is_some_and(is_word) {
                chars.next();
            }
            continue;
        }
        out.push(c);
    }
    out
}
